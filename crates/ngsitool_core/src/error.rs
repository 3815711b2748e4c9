use thiserror::Error;

use crate::dialect::Dialect;

/// Failures raised by the bulk copy/remove engine. None of them are retried.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("{endpoint}: transport failure: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint}: {status} {body}")]
    UpstreamStatus {
        endpoint: String,
        status: String,
        body: String,
    },

    #[error("{endpoint}: {dialect} count signal unparsable: {detail}")]
    CountUnparsable {
        endpoint: String,
        dialect: Dialect,
        detail: String,
    },

    #[error("{endpoint}: error {code} {reason_phrase}")]
    UpstreamItem {
        endpoint: String,
        code: String,
        reason_phrase: String,
    },

    /// `endpoint` is unset only for payloads built before any request.
    #[error("{}{context}: {message}", endpoint_prefix(.endpoint))]
    Decode {
        endpoint: Option<String>,
        context: String,
        message: String,
    },

    #[error("cannot copy entities from {from} to {to}: not yet implemented")]
    DialectMismatch { from: Dialect, to: Dialect },

    #[error("{0}")]
    InvalidJob(String),

    #[error("failed to write operator output")]
    Output(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    UpstreamStatus,
    CountUnparsable,
    UpstreamItem,
    Decode,
    DialectMismatch,
    InvalidJob,
    Output,
}

impl MigrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::UpstreamStatus { .. } => ErrorKind::UpstreamStatus,
            Self::CountUnparsable { .. } => ErrorKind::CountUnparsable,
            Self::UpstreamItem { .. } => ErrorKind::UpstreamItem,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::DialectMismatch { .. } => ErrorKind::DialectMismatch,
            Self::InvalidJob(_) => ErrorKind::InvalidJob,
            Self::Output(_) => ErrorKind::Output,
        }
    }

    pub(crate) fn decode(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            endpoint: None,
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn decode_at(
        endpoint: &str,
        context: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        Self::decode(context, message).at(endpoint)
    }

    pub(crate) fn count(endpoint: &str, dialect: Dialect, detail: impl Into<String>) -> Self {
        Self::CountUnparsable {
            endpoint: endpoint.to_string(),
            dialect,
            detail: detail.into(),
        }
    }

    pub(crate) fn upstream_item(
        endpoint: &str,
        code: impl Into<String>,
        reason_phrase: impl Into<String>,
    ) -> Self {
        Self::UpstreamItem {
            endpoint: endpoint.to_string(),
            code: code.into(),
            reason_phrase: reason_phrase.into(),
        }
    }

    /// Attach the exchange a decode failure came from, unless it already has one.
    pub(crate) fn at(self, endpoint: &str) -> Self {
        match self {
            Self::Decode {
                endpoint: None,
                context,
                message,
            } => Self::Decode {
                endpoint: Some(endpoint.to_string()),
                context,
                message,
            },
            other => other,
        }
    }
}

fn endpoint_prefix(endpoint: &Option<String>) -> String {
    endpoint
        .as_deref()
        .map(|endpoint| format!("{endpoint}: "))
        .unwrap_or_default()
}

pub type MigrationResult<T> = Result<T, MigrationError>;
