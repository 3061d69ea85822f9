//! Secret references in configuration values.
//!
//! - `env::VAR_NAME` reads `$VAR_NAME`
//! - `pass::path/in/store` runs `pass show path/in/store` and keeps the first line
//! - anything else is used as-is

use std::process::Command;

use thiserror::Error;

/// A secret reference that could not be resolved.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    /// The referenced environment variable is unset or not unicode.
    #[error("environment variable `{0}` is not set")]
    MissingEnv(String),

    /// `pass` could not be run or failed.
    #[error("`pass show {path}` failed: {reason}")]
    Pass { path: String, reason: String },
}

/// Resolves `value`, expanding `env::` and `pass::` references.
pub fn resolve(value: &str) -> Result<String, SecretError> {
    if let Some(var) = value.strip_prefix("env::") {
        std::env::var(var).map_err(|_| SecretError::MissingEnv(var.to_string()))
    } else if let Some(path) = value.strip_prefix("pass::") {
        resolve_pass(path)
    } else {
        Ok(value.to_string())
    }
}

/// Returns true if `value` is a reference rather than a literal secret.
pub fn is_reference(value: &str) -> bool {
    value.starts_with("env::") || value.starts_with("pass::")
}

fn resolve_pass(path: &str) -> Result<String, SecretError> {
    let failed = |reason: String| SecretError::Pass {
        path: path.to_string(),
        reason,
    };

    let output = Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|e| failed(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(failed(format!("{}: {}", output.status, stderr.trim())));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| failed("no output".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_values_pass_through() {
        assert_eq!(resolve("plain-secret").unwrap(), "plain-secret");
        assert_eq!(resolve("").unwrap(), "");
        assert!(!is_reference("plain-secret"));
    }

    #[test]
    fn env_reference() {
        unsafe {
            std::env::set_var("_CALBRIDGE_TEST_SECRET", "from-env");
        }
        assert!(is_reference("env::_CALBRIDGE_TEST_SECRET"));
        assert_eq!(resolve("env::_CALBRIDGE_TEST_SECRET").unwrap(), "from-env");
        unsafe {
            std::env::remove_var("_CALBRIDGE_TEST_SECRET");
        }
    }

    #[test]
    fn missing_env_reference() {
        assert_eq!(
            resolve("env::_CALBRIDGE_UNSET_VAR_4711").unwrap_err(),
            SecretError::MissingEnv("_CALBRIDGE_UNSET_VAR_4711".to_string())
        );
    }

    #[test]
    fn failing_pass_reference() {
        // Fails whether or not `pass` is installed.
        let err = resolve("pass::calbridge/test/entry/that/does/not/exist").unwrap_err();
        assert!(matches!(err, SecretError::Pass { .. }));
    }
}
