use err_derive::Error;
use hyper::StatusCode;

#[derive(Debug, Error)]
pub enum Error {
	#[error(display = "{}", _0)]
	Internal(#[error(source, from)] coord_util::error::Error),

	#[error(display = "Bad request: {}", _0)]
	BadRequest(String),

	/// A 400 whose wire body must be the message verbatim, with no
	/// `"Bad request: "` prefix, per a contract that pins the exact text.
	#[error(display = "{}", _0)]
	BadRequestBare(String),

	#[error(display = "Not found: {}", _0)]
	NotFound(String),

	#[error(display = "Upstream error: {}", _0)]
	BadGateway(String),

	#[error(display = "HTTP error: {}", _0)]
	Hyper(#[error(source, from)] hyper::Error),

	#[error(display = "JSON error: {}", _0)]
	Json(#[error(source, from)] serde_json::Error),
}

impl Error {
	pub fn status_code(&self) -> StatusCode {
		match self {
			Error::BadRequest(_) | Error::BadRequestBare(_) => StatusCode::BAD_REQUEST,
			Error::NotFound(_) => StatusCode::NOT_FOUND,
			Error::BadGateway(_) => StatusCode::BAD_GATEWAY,
			Error::Json(_) => StatusCode::BAD_REQUEST,
			Error::Internal(_) | Error::Hyper(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	pub fn into_response(self) -> hyper::Response<hyper::Body> {
		tracing::warn!("request failed: {}", self);
		let body = serde_json::json!({ "error": self.to_string() });
		hyper::Response::builder()
			.status(self.status_code())
			.header("Content-Type", "application/json")
			.body(hyper::Body::from(body.to_string()))
			.unwrap()
	}
}
