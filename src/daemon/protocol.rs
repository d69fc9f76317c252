//! Command protocol for the message queue.
//!
//! Each queue message is one text line. Tokens are separated by whitespace;
//! the first token is the keyword and the rest are arguments.
//!
//! CHANGELOG:
//! - 10/12/2026 - Initial implementation

use thiserror::Error;

/// One operator command, built fresh from each queue message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    tokens: Vec<String>,
}

impl Command {
    /// Tokenize a text line.
    pub fn parse(line: &str) -> Self {
        Self {
            tokens: line.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// Tokenize a raw queue message. Invalid UTF-8 is replaced and NUL padding
    /// is ignored.
    pub fn from_message(message: &[u8]) -> Self {
        let text = String::from_utf8_lossy(message);
        Self::parse(text.trim_end_matches('\0'))
    }

    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// First token, as typed.
    pub fn keyword(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    /// Tokens after the keyword.
    pub fn args(&self) -> Vec<&str> {
        self.tokens.iter().skip(1).map(String::as_str).collect()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

/// Failure inside a command handler. Always recovered at dispatch.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    BadArguments(String),

    #[error("Database {0} not found or is not accessible")]
    StoreNotFound(String),

    #[error("{0}")]
    BackendUnavailable(String),

    #[error("{0}")]
    Unknown(String),
}

/// Outcome of one dispatch: success flag plus console lines for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerResult {
    pub success: bool,
    pub lines: Vec<String>,
}

impl HandlerResult {
    pub fn success(lines: Vec<String>) -> Self {
        Self {
            success: true,
            lines,
        }
    }

    pub fn failure(lines: Vec<String>) -> Self {
        Self {
            success: false,
            lines,
        }
    }
}
