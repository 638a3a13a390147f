// ABOUTME: Backup command implementation.
// ABOUTME: Creates, lists, or prunes backups; mutations hold the environment lease.

use super::connection::Connection;
use super::report_warnings;
use slotctl::backup::BackupKind;
use slotctl::config::Config;
use slotctl::diagnostics::Diagnostics;
use slotctl::error::{Error, Result};
use slotctl::output::Output;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupAction {
    Create,
    List,
    Prune,
}

impl BackupAction {
    pub fn from_flags(list: bool, prune: bool) -> Self {
        match (list, prune) {
            (true, _) => BackupAction::List,
            (false, true) => BackupAction::Prune,
            (false, false) => BackupAction::Create,
        }
    }
}

pub async fn backup(
    config: &Config,
    environment: &str,
    kind: BackupKind,
    action: BackupAction,
    force: bool,
    mut output: Output,
) -> Result<()> {
    let settings = config.settings(environment)?;
    output.start_timer();

    let mut diag = Diagnostics::default();
    let connection = Connection::open(&settings, &output).await?;
    let result: Result<()> = async {
        let ctx = connection.context(&settings, false).await?;
        let manager = ctx.backup_manager();
        match action {
            BackupAction::List => {
                let records = manager.list(kind).await?;
                for record in &records {
                    output.progress(&format!(
                        "  {}  {:>12}  {}",
                        record.created_at.format("%Y-%m-%d %H:%M:%S"),
                        record.size,
                        record.path
                    ));
                }
                output.result(&format!("{} {} backup(s)", records.len(), kind), &records);
                Ok(())
            }
            BackupAction::Prune => {
                let manager = &manager;
                let removed = connection
                    .leased(&settings, force, &mut diag, move || async move {
                        manager.prune().await.map_err(Error::from)
                    })
                    .await?;
                output.result(&format!("Pruned {} backup(s)", removed.len()), &removed);
                Ok(())
            }
            BackupAction::Create => {
                output.progress(&format!("  → Creating {} backup...", kind));
                let manager = &manager;
                let record = connection
                    .leased(&settings, force, &mut diag, move || async move {
                        manager.create(kind).await.map_err(Error::from)
                    })
                    .await?;
                output.result(
                    &format!("Created {} ({} bytes, verified)", record.path, record.size),
                    &record,
                );
                Ok(())
            }
        }
    }
    .await;
    connection.close(&mut diag).await;
    report_warnings(&output, diag.warnings());
    result
}
