// ABOUTME: Deploy command implementation.
// ABOUTME: Opens the control channel, takes the lease, and runs the orchestrator.

use super::connection::Connection;
use super::report_warnings;
use slotctl::config::Config;
use slotctl::deploy::{DeployOutcome, DeploymentOrchestrator};
use slotctl::diagnostics::Diagnostics;
use slotctl::error::{Error, Result};
use slotctl::output::Output;

pub async fn deploy(
    config: &Config,
    environment: &str,
    image: &str,
    force: bool,
    mut output: Output,
) -> Result<()> {
    let settings = config.settings(environment)?;
    let image = settings
        .deploy_image(image)
        .map_err(|e| Error::Config(e.to_string()))?;

    output.start_timer();
    output.progress(&format!(
        "Deploying {} to {} ({})",
        image, environment, settings.connection.target
    ));

    let mut diag = Diagnostics::default();
    let connection = Connection::open(&settings, &output).await?;
    let result = async {
        let ctx = connection.context(&settings, true).await?;
        let ctx = &ctx;
        let output = &output;
        connection
            .leased(&settings, force, &mut diag, move || async move {
                output.progress(&format!("  → Rolling {} out...", image));
                DeploymentOrchestrator::new(ctx)
                    .deploy(image)
                    .await
                    .map_err(Error::from)
            })
            .await
    }
    .await;
    connection.close(&mut diag).await;
    report_warnings(&output, diag.warnings());

    match result {
        Ok(outcome) => {
            report_warnings(&output, &outcome.warnings);
            output.result(&summary(&outcome), &outcome);
            Ok(())
        }
        Err(Error::Deploy(failure)) => {
            if let Some(incident) = &failure.incident {
                output.progress(&format!("  → Incident snapshot: {}", incident));
            }
            Err(Error::Deploy(failure))
        }
        Err(e) => Err(e),
    }
}

fn summary(outcome: &DeployOutcome) -> String {
    match outcome.previous {
        Some(previous) => format!(
            "Deployed {} to {} slot (was {})",
            outcome.image, outcome.color, previous
        ),
        None => format!("Deployed {} to {} slot (initial deployment)", outcome.image, outcome.color),
    }
}
