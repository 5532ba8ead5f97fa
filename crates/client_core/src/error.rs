use shared::error::{ApiException, ErrorCode};
use thiserror::Error;

use crate::processor::PendingKey;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("feed index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("{operation} request failed: {source}")]
    Request {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("{operation} rejected by server ({code:?}): {message}")]
    Rejected {
        operation: &'static str,
        code: ErrorCode,
        message: String,
    },
    #[error("{key} is already in flight")]
    InFlight { key: PendingKey },
}

impl ClientError {
    /// Wraps a resource-client failure, keeping the server's error body when there is one.
    pub fn from_request(operation: &'static str, err: anyhow::Error) -> Self {
        match err.downcast::<ApiException>() {
            Ok(rejected) => ClientError::Rejected {
                operation,
                code: rejected.code,
                message: rejected.message,
            },
            Err(source) => ClientError::Request { operation, source },
        }
    }

    /// Message shown through the notification channel.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Rejected { message, .. } => message.clone(),
            ClientError::Request { .. } => "Request failed. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Why a handler returned without doing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotLoggedIn,
    NotOwner,
    InFlight,
    Declined,
    EmptyInput,
    Unchanged,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T = ()> {
    Applied(T),
    Skipped(SkipReason),
}

impl<T> Outcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Outcome::Applied(_) => None,
            Outcome::Skipped(reason) => Some(*reason),
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
