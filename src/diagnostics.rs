// ABOUTME: Diagnostics accumulator for non-fatal warnings during deploy and rollback.
// ABOUTME: Collects failures that shouldn't abort a run but should be shown to operators.

use serde::Serialize;

/// Collects non-fatal warnings during a run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Pre-deploy backup failed or was skipped.
    pub fn backup(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Backup, message)
    }

    /// Superseded slot could not be removed.
    pub fn cleanup(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Cleanup, message)
    }

    /// LastKnownGood could not be written.
    pub fn known_good(message: impl Into<String>) -> Self {
        Self::new(WarningKind::KnownGood, message)
    }

    pub fn lease_release(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LeaseRelease, message)
    }

    pub fn ssh_disconnect(message: impl Into<String>) -> Self {
        Self::new(WarningKind::SshDisconnect, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    Backup,
    Cleanup,
    KnownGood,
    /// Lease record may remain on the target until it expires.
    LeaseRelease,
    SshDisconnect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn constructors_set_kind() {
        let mut diag = Diagnostics::default();
        diag.warn(Warning::backup("no data_dir configured"));
        diag.warn(Warning::cleanup("old slot still present"));

        let kinds: Vec<_> = diag.into_warnings().into_iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::Backup, WarningKind::Cleanup]);
    }
}
