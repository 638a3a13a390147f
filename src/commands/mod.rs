// ABOUTME: Command module aggregator for the slotctl CLI.
// ABOUTME: Re-exports the init, deploy, rollback, health, and backup handlers.

mod backup;
mod connection;
mod deploy;
mod health;
mod init;
mod rollback;

pub use backup::{BackupAction, backup};
pub use deploy::deploy;
pub use health::health;
pub use init::init;
pub use rollback::rollback;

use slotctl::diagnostics::Warning;
use slotctl::output::Output;

/// Emit collected warnings once the command has finished.
fn report_warnings<'w>(output: &Output, warnings: impl IntoIterator<Item = &'w Warning>) {
    for warning in warnings {
        output.warning(&warning.message);
    }
}
