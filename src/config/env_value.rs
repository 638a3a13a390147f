// ABOUTME: Environment variable values for container env with interpolation.
// ABOUTME: Either a literal or a reference to a variable in the invoking shell.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// One `env:` entry: `KEY: value` or `KEY: { env: VAR, default: value }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => std::env::var(var)
                .ok()
                .or_else(|| default.clone())
                .ok_or_else(|| Error::MissingEnvVar(var.clone())),
        }
    }
}

pub fn resolve_env_map(map: &HashMap<String, EnvValue>) -> Result<HashMap<String, String>> {
    map.iter()
        .map(|(k, v)| v.resolve().map(|resolved| (k.clone(), resolved)))
        .collect()
}

/// Parse `KEY=VALUE` lines of an env file. Blank lines and `#` comments are
/// skipped, an `export ` prefix is tolerated, and matching outer quotes are
/// stripped from values.
pub fn parse_env_file(content: &str) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let (key, value) = line.split_once('=').ok_or_else(|| {
            Error::Config(format!("env file line {}: expected KEY=VALUE", index + 1))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Config(format!("env file line {}: empty key", index + 1)));
        }
        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    Ok(vars)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_file_skips_comments_and_strips_quotes() {
        let vars = parse_env_file(
            "# database\nexport DB_URL=\"postgres://db/app\"\n\nMODE='blue'\nEMPTY=\n",
        )
        .unwrap();
        assert_eq!(vars["DB_URL"], "postgres://db/app");
        assert_eq!(vars["MODE"], "blue");
        assert_eq!(vars["EMPTY"], "");
        assert_eq!(vars.len(), 3);
    }

    #[test]
    fn env_file_rejects_lines_without_equals() {
        let err = parse_env_file("OK=1\nbroken\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn from_env_falls_back_to_default() {
        let value = EnvValue::FromEnv {
            var: "SLOTCTL_SURELY_UNSET_VAR".to_string(),
            default: Some("fallback".to_string()),
        };
        assert_eq!(value.resolve().unwrap(), "fallback");
    }
}
