use hyper::{Body, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use coord_model::NodeStatus;

use crate::error::Error;
use crate::state::ApiState;

#[derive(Deserialize)]
struct SparqlJsonBody {
	query: Option<String>,
}

/// Accepts the three shapes SPARQL endpoints conventionally take: a JSON
/// body `{"query": "..."}`, a raw `application/sparql-query` body, or a
/// form-encoded `query=...` body. Returns `None` if no query was present.
async fn extract_query(req: Request<Body>) -> Result<Option<String>, Error> {
	let content_type = req
		.headers()
		.get("content-type")
		.and_then(|v| v.to_str().ok())
		.unwrap_or("")
		.to_string();

	let bytes = hyper::body::to_bytes(req.into_body()).await?;

	if content_type.contains("application/sparql-query") {
		return Ok(Some(String::from_utf8_lossy(&bytes).to_string()));
	}

	if content_type.contains("application/x-www-form-urlencoded") {
		let form: HashMap<String, String> = form_urlencoded::parse(&bytes).into_owned().collect();
		return Ok(form.get("query").cloned());
	}

	if bytes.is_empty() {
		return Ok(None);
	}

	let body: SparqlJsonBody = serde_json::from_slice(&bytes)
		.map_err(|e| Error::BadRequest(format!("invalid JSON body: {}", e)))?;
	Ok(body.query)
}

pub async fn handle_sparql(state: &ApiState, req: Request<Body>) -> Result<Response<Body>, Error> {
	let query = extract_query(req)
		.await?
		.ok_or_else(|| Error::BadRequestBare("No query provided".to_string()))?;

	let nodes = state.registry.list().await.map_err(Error::Internal)?;
	let live_urls: Vec<String> = nodes
		.into_iter()
		.filter(|n| n.status == NodeStatus::Healthy)
		.map(|n| n.node_url)
		.collect();

	if live_urls.is_empty() {
		return Err(Error::Internal(coord_util::error::Error::message(
			"no live catalogue nodes available to answer the query",
		)));
	}

	if let Some(upstream) = &state.federation_upstream_url {
		let (status, content_type, body) = state
			.federation
			.rewrite_and_forward(&query, &live_urls, upstream)
			.await
			.map_err(|e| Error::BadGateway(e.to_string()))?;

		let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
		return Ok(Response::builder()
			.status(status)
			.header("Content-Type", content_type)
			.body(Body::from(body))
			.unwrap());
	}

	let results = state.federation.fan_out_merge(&query, &live_urls).await;
	let body: Value = serde_json::to_value(&results)?;
	Ok(Response::builder()
		.status(StatusCode::OK)
		.header("Content-Type", "application/sparql-results+json")
		.body(Body::from(body.to_string()))
		.unwrap())
}
