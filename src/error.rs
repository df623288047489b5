//! Error taxonomy shared by every operation in the crate.
//!
//! Three families matter to the operator: validation failures caught before
//! any request is sent, transport failures, and writes rejected by the school
//! server. All of them collapse into a single transient notice via
//! [`DeskError::notice`]; nothing is retried automatically.

use reqwest::StatusCode;

pub type Result<T> = std::result::Result<T, DeskError>;

#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    /// Client-side validation failed; no request was issued.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("{message} (HTTP {status})")]
    Server { status: u16, message: String },

    #[error("Invalid response from school server: {0}")]
    Decode(String),

    #[error("Not signed in")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("Failed to generate receipt: {0}")]
    Receipt(String),

    /// Some writes of a batch failed; none of it is reported as success.
    #[error("{failed} of {total} writes failed")]
    Batch { failed: usize, total: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse classification used when deciding what the operator sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Validation,
    Transport,
    Rejected,
}

impl DeskError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            DeskError::Validation(_) | DeskError::Forbidden(_) | DeskError::Unauthenticated => {
                FailureKind::Validation
            }
            DeskError::Transport(_) | DeskError::Io(_) | DeskError::Storage(_) => {
                FailureKind::Transport
            }
            DeskError::Server { .. }
            | DeskError::Decode(_)
            | DeskError::Receipt(_)
            | DeskError::Batch { .. } => {
                FailureKind::Rejected
            }
        }
    }

    /// The one message shown to the operator for this failure.
    ///
    /// Validation and access failures carry their own corrective text; every
    /// other failure is reported with the operation's generic message.
    pub fn notice(&self, generic: &str) -> String {
        match self.kind() {
            FailureKind::Validation => self.to_string(),
            FailureKind::Transport | FailureKind::Rejected => generic.to_string(),
        }
    }

    /// Like [`notice`](Self::notice), but surfaces the server's own message
    /// when it sent one. Used where the old pages echoed `error` from the
    /// response body (login, account creation).
    pub fn notice_with_detail(&self, generic: &str) -> String {
        match self {
            DeskError::Server { message, .. } if !message.trim().is_empty() => message.clone(),
            other => other.notice(generic),
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            DeskError::Unauthenticated | DeskError::Server { status: 401, .. }
        )
    }
}

/// Convert an HTTP status code into a user-friendly message.
pub(crate) fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Session expired or invalid credentials".to_string(),
        403 => "Not authorized for this action".to_string(),
        404 => "School server endpoint not found".to_string(),
        s if s >= 500 => format!("School server error (HTTP {s})"),
        s => format!("Unexpected response from school server (HTTP {s})"),
    }
}

/// Convert a `reqwest::Error` into a user-friendly message.
pub(crate) fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach school server at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid school server URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_notice_keeps_specific_text() {
        let err = DeskError::validation("Enter a valid payment amount");
        assert_eq!(err.kind(), FailureKind::Validation);
        assert_eq!(
            err.notice("Failed to add payment"),
            "Enter a valid payment amount"
        );
    }

    #[test]
    fn transport_and_server_failures_use_generic_notice() {
        let transport = DeskError::Transport("Cannot reach school server".into());
        let server = DeskError::Server {
            status: 500,
            message: "boom".into(),
        };
        assert_eq!(transport.notice("Failed to add payment"), "Failed to add payment");
        assert_eq!(server.notice("Failed to add payment"), "Failed to add payment");
        assert_eq!(server.kind(), FailureKind::Rejected);

        let batch = DeskError::Batch { failed: 1, total: 3 };
        assert_eq!(batch.to_string(), "1 of 3 writes failed");
        assert_eq!(batch.notice("Failed to submit attendance"), "Failed to submit attendance");
    }

    #[test]
    fn detail_notice_prefers_server_message() {
        let server = DeskError::Server {
            status: 400,
            message: "Email already registered".into(),
        };
        assert_eq!(
            server.notice_with_detail("Error creating student"),
            "Email already registered"
        );
        let empty = DeskError::Server {
            status: 400,
            message: " ".into(),
        };
        assert_eq!(empty.notice_with_detail("Login failed"), "Login failed");
    }

    #[test]
    fn status_messages() {
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED),
            "Session expired or invalid credentials"
        );
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY),
            "School server error (HTTP 502)"
        );
        assert!(DeskError::Server {
            status: 401,
            message: String::new()
        }
        .is_auth_failure());
    }
}
