// ABOUTME: Rollback command implementation.
// ABOUTME: Runs the selected rollback tiers under the environment lease.

use super::connection::Connection;
use super::report_warnings;
use slotctl::config::Config;
use slotctl::diagnostics::Diagnostics;
use slotctl::error::{Error, Result};
use slotctl::output::Output;
use slotctl::rollback::{RollbackCoordinator, RollbackMode};

pub async fn rollback(
    config: &Config,
    environment: &str,
    mode: RollbackMode,
    force: bool,
    mut output: Output,
) -> Result<()> {
    let settings = config.settings(environment)?;
    output.start_timer();
    output.progress(&format!("Rolling back {} ({} mode)", environment, mode));

    let mut diag = Diagnostics::default();
    let connection = Connection::open(&settings, &output).await?;
    let result = async {
        let ctx = connection.context(&settings, true).await?;
        let ctx = &ctx;
        connection
            .leased(&settings, force, &mut diag, move || async move {
                RollbackCoordinator::new(ctx)
                    .rollback(mode)
                    .await
                    .map_err(Error::from)
            })
            .await
    }
    .await;
    connection.close(&mut diag).await;
    report_warnings(&output, diag.warnings());

    let outcome = result?;
    for incident in &outcome.incidents {
        output.progress(&format!("  → Incident snapshot: {}", incident));
    }
    let message = if outcome.changed {
        format!(
            "Rolled back via {} tier: {} slot serves {}",
            outcome.tier, outcome.color, outcome.image
        )
    } else {
        format!(
            "Rollback already in place: {} slot serves {}",
            outcome.color, outcome.image
        )
    };
    output.result(&message, &outcome);
    Ok(())
}
