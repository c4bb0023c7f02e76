//! Error types for the CLI

use std::fmt;
use std::path::PathBuf;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Known load balancer provisioning failures recognised from ingress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// An HTTPS listener was requested without a certificate
    MissingCertificate,
    /// The controller's IAM role lacks a required permission
    AuthorizationDenied,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::MissingCertificate => write!(f, "missing certificate"),
            FailureKind::AuthorizationDenied => write!(f, "authorization denied"),
        }
    }
}

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("config file not found: {path} (run `higress-deploy init` to create one)")]
    ConfigNotFound { path: PathBuf },

    #[error("invalid config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("required tools not installed: {}", tools.join(", "))]
    MissingTools { tools: Vec<String> },

    #[error("command failed: {command}: {message}")]
    CommandFailed { command: String, message: String },

    #[error("load balancer creation failed ({kind}): {message}")]
    Remediation {
        kind: FailureKind,
        message: String,
        hint: String,
    },

    #[error("add-on {addon} entered terminal status {status}")]
    AddonFailed { addon: String, status: String },

    #[error("aborted: {reason}")]
    Aborted { reason: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Error::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        Error::Aborted {
            reason: reason.into(),
        }
    }

    /// Operator-facing fix for errors that have a known remedy.
    pub fn remediation(&self) -> Option<&str> {
        match self {
            Error::Remediation { hint, .. } => Some(hint),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remediation_hint_only_for_classified_errors() {
        let err = Error::Remediation {
            kind: FailureKind::MissingCertificate,
            message: "certificate must be specified".to_string(),
            hint: "set alb.certificate_arn".to_string(),
        };
        assert_eq!(err.remediation(), Some("set alb.certificate_arn"));
        assert!(err.to_string().contains("missing certificate"));

        let err = Error::command_failed("kubectl get nodes", "exit status 1");
        assert!(err.remediation().is_none());
        assert_eq!(
            err.to_string(),
            "command failed: kubectl get nodes: exit status 1"
        );
    }

    #[test]
    fn missing_tools_lists_every_tool() {
        let err = Error::MissingTools {
            tools: vec!["eksctl".to_string(), "helm".to_string()],
        };
        assert_eq!(err.to_string(), "required tools not installed: eksctl, helm");
    }
}
