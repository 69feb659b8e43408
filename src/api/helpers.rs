use hyper::{Body, Request, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::Error;

pub fn json_ok_response<T: Serialize>(value: &T) -> Result<Response<Body>, Error> {
	let body = serde_json::to_string(value)?;
	Ok(Response::builder()
		.status(StatusCode::OK)
		.header("Content-Type", "application/json")
		.body(Body::from(body))
		.unwrap())
}

pub async fn parse_json_body<T: DeserializeOwned>(req: Request<Body>) -> Result<T, Error> {
	let bytes = hyper::body::to_bytes(req.into_body()).await?;
	serde_json::from_slice(&bytes).map_err(|e| Error::BadRequest(format!("invalid JSON body: {}", e)))
}
