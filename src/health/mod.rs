// ABOUTME: Slot health verification: bounded probes, HTTP transports, and the operator report.
// ABOUTME: Everything here is read-only against the runtime and the service.

mod http;
mod policy;
mod probe;
mod report;

pub use http::{HttpError, HttpResponse, HttpTransport, LocalHttp, SshHttp};
pub use policy::{BackoffPolicy, Exhausted};
pub use probe::{CheckKind, HealthCheckResult, HealthProbe, HealthTimeout, RuntimeHealth};
pub use report::{Finding, HealthReport, ReportMode, Reporter, count_error_lines};
