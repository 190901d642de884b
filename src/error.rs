//! Error types.
//!
//! None of these are fatal to a page: the [`Runtime`](`crate::Runtime`) logs them and continues with whatever state existed before the failing operation.

use thiserror::Error;

/// A state path could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
	#[error("empty state path")]
	Empty,
	#[error("empty segment at byte {0} of state path {1:?}")]
	EmptySegment(usize, String),
	#[error("unterminated `[` in state path {0:?}")]
	UnterminatedBracket(String),
}

/// A condition or template expression could not be parsed or evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
	#[error("unexpected character {found:?} at byte {at}")]
	UnexpectedChar { found: char, at: usize },
	#[error("unterminated string literal starting at byte {0}")]
	UnterminatedString(usize),
	#[error("unexpected token {found} at byte {at}")]
	UnexpectedToken { found: String, at: usize },
	#[error("unexpected end of expression")]
	UnexpectedEnd,
	#[error("invalid number literal {0:?}")]
	InvalidNumber(String),
	#[error("trailing input at byte {0}")]
	Trailing(usize),
}

/// An AJAX round trip failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AjaxError {
	#[error("transport failure: {0}")]
	Transport(String),
	#[error("server responded with HTTP status {status}")]
	Status { status: u16, body: String },
	#[error("unknown request id {0}")]
	UnknownRequest(u64),
}

/// A realtime message could not be sent or understood.
#[derive(Debug, Error)]
pub enum RealtimeError {
	#[error("realtime channel is not connected")]
	NotConnected,
	#[error("socket send failed: {0}")]
	Send(String),
	#[error("malformed realtime message: {0}")]
	Malformed(#[from] serde_json::Error),
	#[error("realtime message of type {0:?} is missing `componentId`")]
	MissingComponentId(String),
	#[error("realtime message targets unknown component {0:?}")]
	UnknownComponent(String),
}

/// Returned by a lifecycle hook. Always caught and logged by [`Runtime::fire_hook`](`crate::Runtime::fire_hook`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl From<&str> for HookError {
	fn from(message: &str) -> Self {
		Self(message.to_owned())
	}
}

impl From<String> for HookError {
	fn from(message: String) -> Self {
		Self(message)
	}
}

/// [`Config`](`crate::Config`) could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid configuration JSON: {0}")]
	Json(#[from] serde_json::Error),
	#[error("attribute prefix must not be empty")]
	EmptyPrefix,
}
