use serde::Deserialize;
use thiserror::Error;

use crate::tasks::types::{FailureCause, TaskKindId};

/// Failures talking to the task backend.
///
/// Messages are stored as text so an error can be kept on a snapshot and
/// handed back to the caller at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The start call came back with a non-success status
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// No HTTP response at all
    #[error("{0}")]
    Transport(String),

    /// A status poll came back with a non-success status
    #[error("Failed to fetch {kind} status: {reason}")]
    StatusUnavailable {
        kind: TaskKindId,
        status: u16,
        reason: String,
    },

    /// The response body broke the start/status contract
    #[error("Invalid response: {0}")]
    Protocol(String),
}

impl BackendError {
    pub fn cause(&self) -> FailureCause {
        match self {
            BackendError::Rejected { .. } => FailureCause::StartRejected,
            BackendError::Transport(_) | BackendError::StatusUnavailable { .. } => {
                FailureCause::Transport
            }
            BackendError::Protocol(_) => FailureCause::ProtocolViolation,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Protocol(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Text(String),
    Fields(Vec<FieldError>),
}

#[derive(Debug, Deserialize)]
struct FieldError {
    #[serde(default)]
    loc: Vec<serde_json::Value>,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<ErrorDetail>,
}

/// Turn a `{detail: string | [{loc, msg}]}` error body into one line of text.
///
/// Field errors are rendered as `loc.path: msg` and joined with `; `. Returns
/// `None` when the body carries no usable detail.
pub fn error_detail_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail? {
        ErrorDetail::Text(text) if !text.is_empty() => Some(text),
        ErrorDetail::Text(_) => None,
        ErrorDetail::Fields(fields) if !fields.is_empty() => Some(
            fields
                .iter()
                .map(|field| {
                    let loc = field
                        .loc
                        .iter()
                        .map(|part| match part {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(".");
                    format!("{loc}: {}", field.msg)
                })
                .collect::<Vec<_>>()
                .join("; "),
        ),
        ErrorDetail::Fields(_) => None,
    }
}
