// ABOUTME: Runtime error types with SNAFU pattern.
// ABOUTME: Detection and socket connection failures, classed as connectivity errors.

use snafu::Snafu;

use super::detection::DetectionError;

/// Failure to find or reach the container runtime.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RuntimeError {
    #[snafu(display("runtime detection failed: {source}"))]
    Detection { source: DetectionError },

    #[snafu(display("cannot reach runtime socket {socket}: {reason}"))]
    Connection { socket: String, reason: String },
}

impl From<DetectionError> for RuntimeError {
    fn from(source: DetectionError) -> Self {
        RuntimeError::Detection { source }
    }
}
