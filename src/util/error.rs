use err_derive::Error;

/// Crate-wide error type. Lower-level errors are wrapped with enough context
/// to log usefully; background loops match on this only to decide whether to
/// retry, never to panic.
#[derive(Debug, Error)]
pub enum Error {
	#[error(display = "I/O error: {}", _0)]
	Io(#[error(source, from)] std::io::Error),

	#[error(display = "JSON error: {}", _0)]
	Json(#[error(source, from)] serde_json::Error),

	#[error(display = "HTTP request error: {}", _0)]
	Http(String),

	#[error(display = "Request timed out")]
	Timeout,

	#[error(display = "Invalid configuration: {}", _0)]
	Config(String),

	#[error(display = "Bad request: {}", _0)]
	BadRequest(String),

	#[error(display = "Not found: {}", _0)]
	NotFound(String),

	#[error(display = "{}", _0)]
	Message(String),
}

impl Error {
	pub fn message<S: Into<String>>(s: S) -> Self {
		Error::Message(s.into())
	}
}

impl From<&str> for Error {
	fn from(s: &str) -> Error {
		Error::Message(s.to_string())
	}
}

impl From<String> for Error {
	fn from(s: String) -> Error {
		Error::Message(s)
	}
}
