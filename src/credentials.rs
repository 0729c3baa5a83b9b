//! API key references.
//!
//! The config file never has to hold the key itself: it can point at an
//! environment variable or a local command that prints it.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Environment variable consulted by default for the API key.
pub const DEFAULT_API_KEY_VAR: &str = "SUNO_API_KEY";

/// Where the API key comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecretRef {
    /// No API key.
    None,
    /// Inline literal key (discouraged; use env/command when possible).
    Literal { value: String },
    /// Resolve the key from an environment variable.
    Env { var: String },
    /// Resolve the key by running a local command.
    Command { cmd: String },
}

impl Default for SecretRef {
    fn default() -> Self {
        Self::Env {
            var: DEFAULT_API_KEY_VAR.to_owned(),
        }
    }
}

impl SecretRef {
    /// Resolve the reference to the key value.
    ///
    /// Returns `Ok(None)` only for [`SecretRef::None`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Secret`] when the variable is missing or empty,
    /// or when the command fails or prints nothing.
    pub fn resolve(&self) -> Result<Option<String>, ConfigError> {
        match self {
            Self::None => Ok(None),
            Self::Literal { value } => {
                if value.trim().is_empty() {
                    return Err(ConfigError::Secret("literal api key is empty".to_owned()));
                }
                Ok(Some(value.trim().to_owned()))
            }
            Self::Env { var } => {
                let value = std::env::var(var).map_err(|_| {
                    ConfigError::Secret(format!("environment variable {var} is not set"))
                })?;
                if value.trim().is_empty() {
                    return Err(ConfigError::Secret(format!(
                        "environment variable {var} is empty"
                    )));
                }
                Ok(Some(value.trim().to_owned()))
            }
            Self::Command { cmd } => {
                if cmd.trim().is_empty() {
                    return Err(ConfigError::Secret("api key command is empty".to_owned()));
                }
                let output = std::process::Command::new("/bin/sh")
                    .arg("-c")
                    .arg(cmd)
                    .output()
                    .map_err(|e| {
                        ConfigError::Secret(format!("failed to run api key command: {e}"))
                    })?;

                if !output.status.success() {
                    return Err(ConfigError::Secret(format!(
                        "api key command failed with status {}",
                        output
                            .status
                            .code()
                            .map_or_else(|| "unknown".to_owned(), |c| c.to_string())
                    )));
                }

                let value = String::from_utf8_lossy(&output.stdout).trim().to_owned();
                if value.is_empty() {
                    return Err(ConfigError::Secret(
                        "api key command returned empty output".to_owned(),
                    ));
                }
                Ok(Some(value))
            }
        }
    }

    /// Short description safe to print (never includes the key).
    pub fn describe(&self) -> String {
        match self {
            Self::None => "none".to_owned(),
            Self::Literal { .. } => "inline value".to_owned(),
            Self::Env { var } => format!("env ${var}"),
            Self::Command { .. } => "command".to_owned(),
        }
    }
}

/// Mask a secret for display, keeping a short prefix.
pub fn mask(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}…")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    struct EnvGuard {
        key: &'static str,
        old: Option<std::ffi::OsString>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let old = std::env::var_os(key);
            unsafe { std::env::set_var(key, value) };
            Self { key, old }
        }

        fn unset(key: &'static str) -> Self {
            let old = std::env::var_os(key);
            unsafe { std::env::remove_var(key) };
            Self { key, old }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old {
                Some(v) => unsafe { std::env::set_var(self.key, v) },
                None => unsafe { std::env::remove_var(self.key) },
            }
        }
    }

    #[test]
    fn env_secret_resolves() {
        let _env = EnvGuard::set("V2M_TEST_KEY_PRESENT", " key-123 ");
        let secret = SecretRef::Env {
            var: "V2M_TEST_KEY_PRESENT".to_owned(),
        };
        assert_eq!(secret.resolve().unwrap(), Some("key-123".to_owned()));
    }

    #[test]
    fn env_secret_missing_errors() {
        let _env = EnvGuard::unset("V2M_TEST_KEY_MISSING");
        let secret = SecretRef::Env {
            var: "V2M_TEST_KEY_MISSING".to_owned(),
        };
        assert!(secret.resolve().is_err());
    }

    #[test]
    fn literal_and_none() {
        let literal = SecretRef::Literal {
            value: "abc".to_owned(),
        };
        assert_eq!(literal.resolve().unwrap(), Some("abc".to_owned()));
        assert_eq!(SecretRef::None.resolve().unwrap(), None);
        assert!(
            SecretRef::Literal {
                value: "  ".to_owned()
            }
            .resolve()
            .is_err()
        );
    }

    #[cfg(unix)]
    #[test]
    fn command_secret_reads_stdout() {
        let secret = SecretRef::Command {
            cmd: "echo from-command".to_owned(),
        };
        assert_eq!(secret.resolve().unwrap(), Some("from-command".to_owned()));
    }

    #[test]
    fn default_points_at_suno_env_var() {
        assert_eq!(
            SecretRef::default(),
            SecretRef::Env {
                var: "SUNO_API_KEY".to_owned()
            }
        );
        assert!(!SecretRef::default().describe().contains("…"));
    }

    #[test]
    fn mask_keeps_prefix_only() {
        assert_eq!(mask("4e2feeb494"), "4e2f…");
    }
}
