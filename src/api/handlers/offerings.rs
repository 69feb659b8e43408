use hyper::{Body, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use coord_placement::submit_bulk_offering_processing;

use crate::error::Error;
use crate::helpers::{json_ok_response, parse_json_body};
use crate::state::ApiState;

#[derive(Serialize)]
struct OfferingStatusResult {
	status: &'static str,
	offering_id: String,
	assigned_node: Option<String>,
	offering_status: Option<Value>,
}

async fn offering_status_response(
	state: &ApiState,
	id: &str,
) -> Result<Response<Body>, Error> {
	let status = state.placement.status(id).await.map_err(Error::Internal)?;
	if status.assigned_node.is_none() {
		return Err(Error::NotFound(format!("offering {} not placed yet", id)));
	}
	json_ok_response(&OfferingStatusResult {
		status: "ok",
		offering_id: id.to_string(),
		assigned_node: status.assigned_node,
		offering_status: status.payload,
	})
}

#[derive(Deserialize)]
struct OfferingsRequest {
	offerings_id: Option<String>,
}

pub async fn handle_get_offering(req: &ApiState, id: String) -> Result<Response<Body>, Error> {
	offering_status_response(req, &id).await
}

pub async fn handle_post_offerings(
	state: &ApiState,
	req: Request<Body>,
) -> Result<Response<Body>, Error> {
	let body: OfferingsRequest = parse_json_body(req).await?;
	let id = body
		.offerings_id
		.ok_or_else(|| Error::BadRequest("missing offerings_id".to_string()))?;
	offering_status_response(state, &id).await
}

#[derive(Serialize)]
struct ProcessSummary {
	total: usize,
	successful: usize,
	failed: usize,
	details: Vec<ProcessDetail>,
}

#[derive(Serialize)]
struct ProcessDetail {
	offering_id: String,
	task_id: String,
}

/// Fetches the ledger's pending offerings, filters out ones already handed
/// to the pool this process, and submits the rest in bulk.
pub async fn handle_process_offerings(state: &ApiState) -> Result<Response<Body>, Error> {
	let offerings = state
		.registry
		.list_offerings()
		.await
		.map_err(Error::Internal)?;

	if offerings.is_empty() {
		return Err(Error::NotFound("no offerings to process".to_string()));
	}

	let fresh: Vec<(String, String)> = offerings
		.into_iter()
		.filter(|(id, _)| !state.placement.already_processed(id))
		.map(|(id, meta)| (id, meta.description_uri))
		.collect();

	let task_ids = submit_bulk_offering_processing(&state.pool, &state.placement, fresh.clone());

	let details: Vec<ProcessDetail> = fresh
		.iter()
		.zip(task_ids.iter())
		.map(|((id, _), task_id)| ProcessDetail {
			offering_id: id.clone(),
			task_id: task_id.clone(),
		})
		.collect();

	json_ok_response(&ProcessSummary {
		total: details.len(),
		successful: 0,
		failed: 0,
		details,
	})
}
