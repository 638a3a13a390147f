// ABOUTME: Health command implementation.
// ABOUTME: Read-only report on the active slot; no lease is taken.

use super::connection::Connection;
use super::report_warnings;
use slotctl::config::Config;
use slotctl::diagnostics::Diagnostics;
use slotctl::error::{Error, Result};
use slotctl::health::{HealthReport, ReportMode, Reporter};
use slotctl::output::Output;

pub async fn health(config: &Config, environment: &str, mode: ReportMode, output: Output) -> Result<()> {
    let settings = config.settings(environment)?;
    output.progress(&format!("Checking {} ({} mode)", environment, mode));

    let mut diag = Diagnostics::default();
    let connection = Connection::open(&settings, &output).await?;
    let result = async {
        let ctx = connection.context(&settings, false).await?;
        Reporter::new(ctx.runtime, ctx.http, ctx.settings)
            .run(mode)
            .await
            .map_err(Error::from)
    }
    .await;
    connection.close(&mut diag).await;
    report_warnings(&output, diag.warnings());

    let report = result?;
    for finding in &report.findings {
        let mark = match (finding.passed, finding.informational) {
            (true, _) => "✓",
            (false, true) => "·",
            (false, false) => "✗",
        };
        output.progress(&format!("  {} {}: {}", mark, finding.check, finding.detail));
    }

    if report.passed() {
        output.result(
            &format!("{} slot of {} is healthy", report.active, environment),
            &report,
        );
        Ok(())
    } else {
        Err(Error::HealthReport(failure_summary(&report)))
    }
}

fn failure_summary(report: &HealthReport) -> String {
    report
        .failures()
        .map(|f| format!("{} ({})", f.check, f.detail))
        .collect::<Vec<_>>()
        .join(", ")
}
