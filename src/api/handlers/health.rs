use hyper::{Body, Response};
use serde::Serialize;

use crate::error::Error;
use crate::helpers::json_ok_response;
use crate::state::ApiState;

#[derive(Serialize)]
struct HealthResult {
	status: &'static str,
	service: String,
	timestamp: u64,
}

pub async fn handle_health(state: &ApiState) -> Result<Response<Body>, Error> {
	json_ok_response(&HealthResult {
		status: "healthy",
		service: state.service_name.clone(),
		timestamp: coord_util::time::now_msec(),
	})
}
