//! The `error` module defines the error types used across the broker.
//!
//! Two layers exist:
//!
//! - [`Problem`] is the wire-visible error. It serializes to
//!   `{"type": "<kind>", "detail": "<text>"}` and is the only error shape a
//!   client ever sees.
//! - [`BrokerError`] is what operations return internally. It is either a
//!   `Problem` or an I/O failure wrapped with the operation that hit it.
//!
//! The connection handler is the only place that turns a `BrokerError` into
//! bytes on the wire, through [`BrokerError::into_problem`], which redacts
//! anything that is not already a `Problem`.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::transport::command::{OP_PUBLISH, OP_SUBSCRIBE};

/// Machine-readable category of a [`Problem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    InvalidCommand,
    InvalidOperation,
    TopicDoesNotExist,
    InternalServerError,
}

impl ProblemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemKind::InvalidCommand => "invalid_command",
            ProblemKind::InvalidOperation => "invalid_operation",
            ProblemKind::TopicDoesNotExist => "topic_does_not_exist",
            ProblemKind::InternalServerError => "internal_server_error",
        }
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A problem detail as written to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {detail}")]
pub struct Problem {
    #[serde(rename = "type")]
    pub kind: ProblemKind,
    #[serde(default)]
    pub detail: String,
}

impl Problem {
    pub fn new(kind: ProblemKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn invalid_operation() -> Self {
        Self::new(
            ProblemKind::InvalidOperation,
            format!("Operation must be '{OP_PUBLISH}' or '{OP_SUBSCRIBE}'."),
        )
    }

    pub fn publish_requires_arguments() -> Self {
        Self::new(
            ProblemKind::InvalidCommand,
            format!("Operation '{OP_PUBLISH}' requires a topic and data as arguments."),
        )
    }

    pub fn subscribe_requires_arguments() -> Self {
        Self::new(
            ProblemKind::InvalidCommand,
            format!("Operation '{OP_SUBSCRIBE}' requires at least one topic as an argument."),
        )
    }

    pub fn topic_not_utf8() -> Self {
        Self::new(ProblemKind::InvalidCommand, "Topic names must be valid UTF-8.")
    }

    pub fn topic_does_not_exist(topic: &str) -> Self {
        Self::new(
            ProblemKind::TopicDoesNotExist,
            format!("Topic '{topic}' does not exist."),
        )
    }

    /// Internal details never leave the process, so the detail is always empty.
    pub fn internal() -> Self {
        Self::new(ProblemKind::InternalServerError, "")
    }

    /// Encodes the problem as a single JSON line.
    pub fn to_json_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Errors returned by broker operations before they reach the client.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Problem(#[from] Problem),

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl BrokerError {
    pub fn io(context: &'static str, source: io::Error) -> Self {
        BrokerError::Io { context, source }
    }

    /// Converts the error into the problem the client is allowed to see.
    ///
    /// Anything that is not already a `Problem` is logged here and replaced
    /// by an empty `internal_server_error`.
    pub fn into_problem(self) -> Problem {
        match self {
            BrokerError::Problem(problem) => problem,
            other => {
                let source = std::error::Error::source(&other);
                error!(error = %other, source = ?source, "internal server error");
                Problem::internal()
            }
        }
    }
}
