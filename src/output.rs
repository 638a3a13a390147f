// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Plain progress lines, quiet (CI), or one JSON event per line.

use serde::Serialize;
use std::time::Instant;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Final results and errors only
    Quiet,
    /// JSON lines for scripting
    Json,
}

impl OutputMode {
    /// `--json` wins over `--quiet`.
    pub fn from_flags(quiet: bool, json: bool) -> Self {
        match (quiet, json) {
            (_, true) => OutputMode::Json,
            (true, false) => OutputMode::Quiet,
            (false, false) => OutputMode::Normal,
        }
    }
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    fn elapsed_secs(&self) -> Option<f64> {
        self.start_time.map(|t| t.elapsed().as_secs_f64())
    }

    /// Print a progress message (normal mode only).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Warning: {message}"),
            OutputMode::Json => self.emit_stderr(&JsonEvent::new("warning", message, None, &())),
        }
    }

    /// Print the final line of a successful command.
    pub fn success(&self, message: &str) {
        self.result(message, &());
    }

    /// Final line plus a structured payload; the payload only shows in JSON mode.
    pub fn result<T: Serialize + ?Sized>(&self, message: &str, data: &T) {
        match self.mode {
            OutputMode::Normal => match self.elapsed_secs() {
                Some(elapsed) => println!("{message} ({:.1}s)", elapsed),
                None => println!("{message}"),
            },
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => {
                let event = JsonEvent::new("success", message, self.elapsed_secs(), data);
                if let Ok(json) = serde_json::to_string(&event) {
                    println!("{json}");
                }
            }
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => {
                self.emit_stderr(&JsonEvent::new("error", message, self.elapsed_secs(), &()))
            }
        }
    }

    fn emit_stderr<T: Serialize + ?Sized>(&self, event: &JsonEvent<'_, T>) {
        if let Ok(json) = serde_json::to_string(event) {
            eprintln!("{json}");
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a, T: Serialize + ?Sized> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "is_unit")]
    data: &'a T,
}

impl<'a, T: Serialize + ?Sized> JsonEvent<'a, T> {
    fn new(event: &'a str, message: &'a str, duration_secs: Option<f64>, data: &'a T) -> Self {
        Self {
            event,
            message,
            duration_secs,
            data,
        }
    }
}

fn is_unit<T: Serialize + ?Sized>(data: &&T) -> bool {
    matches!(serde_json::to_value(data), Ok(serde_json::Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_wins_over_quiet() {
        assert_eq!(OutputMode::from_flags(true, true), OutputMode::Json);
        assert_eq!(OutputMode::from_flags(true, false), OutputMode::Quiet);
        assert_eq!(OutputMode::from_flags(false, false), OutputMode::Normal);
    }

    #[test]
    fn unit_payload_is_omitted() {
        let event = JsonEvent::new("success", "done", None, &());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, serde_json::json!({"event": "success", "message": "done"}));

        let data = vec![1, 2];
        let event = JsonEvent::new("success", "done", Some(1.5), &data);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["data"], serde_json::json!([1, 2]));
    }
}
