//! HTTP surface for the Catalogue Coordinator: routes `/health`,
//! `/offerings`, `/offerings/process`, `/offerings/status/<id>` and
//! `/sparql` onto the handlers in [`handlers`], over the shared
//! [`ApiState`](state::ApiState). The composition root owns the listener;
//! this crate only supplies the `hyper` service.

pub mod error;
pub mod handlers;
pub mod helpers;
pub mod state;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server};

use crate::error::Error;
use crate::state::ApiState;

async fn route(state: Arc<ApiState>, req: Request<Body>) -> Result<Response<Body>, Error> {
	let method = req.method().clone();
	let path = req.uri().path().to_string();

	match (&method, path.as_str()) {
		(&Method::GET, "/health") => handlers::health::handle_health(&state).await,
		(&Method::POST, "/offerings") => handlers::offerings::handle_post_offerings(&state, req).await,
		(&Method::POST, "/offerings/process") => {
			handlers::offerings::handle_process_offerings(&state).await
		}
		(&Method::GET, p) if p.starts_with("/offerings/status/") => {
			let id = p.trim_start_matches("/offerings/status/").to_string();
			if id.is_empty() {
				return Err(Error::NotFound("missing offering id".to_string()));
			}
			handlers::offerings::handle_get_offering(&state, id).await
		}
		(&Method::POST, "/sparql") => handlers::sparql::handle_sparql(&state, req).await,
		_ => Err(Error::NotFound(format!("no such route: {} {}", method, path))),
	}
}

async fn serve(state: Arc<ApiState>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
	match route(state, req).await {
		Ok(resp) => Ok(resp),
		Err(e) => Ok(e.into_response()),
	}
}

/// Binds `addr` and serves the Coordinator's HTTP surface until `shutdown`
/// resolves, at which point `hyper` stops accepting new connections and
/// drains in-flight ones.
pub async fn run_server(
	addr: SocketAddr,
	state: Arc<ApiState>,
	shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), hyper::Error> {
	let make_svc = make_service_fn(move |_conn| {
		let state = state.clone();
		async move { Ok::<_, Infallible>(service_fn(move |req| serve(state.clone(), req))) }
	});

	tracing::info!("HTTP server listening on {}", addr);
	Server::bind(&addr)
		.serve(make_svc)
		.with_graceful_shutdown(shutdown)
		.await
}

#[cfg(test)]
mod test {
	use super::*;
	use coord_federation::FederationEngine;
	use coord_kv::mem::MemKv;
	use coord_placement::PlacementDriver;
	use coord_pool::WorkerPool;
	use coord_registry::NodeRegistry;
	use coord_ring::HashRing;
	use hyper::body::to_bytes;

	fn test_state() -> Arc<ApiState> {
		let kv: Arc<dyn coord_kv::KvStore> = Arc::new(MemKv::new());
		let ring = Arc::new(HashRing::new(8));
		Arc::new(ApiState {
			kv: kv.clone(),
			ring: ring.clone(),
			registry: Arc::new(NodeRegistry::new(
				kv.clone(),
				"http://unreachable.invalid".to_string(),
				true,
				"does-not-exist.json".to_string(),
			)),
			placement: Arc::new(PlacementDriver::new(kv, ring, 2)),
			pool: Arc::new(WorkerPool::new(4)),
			federation: Arc::new(FederationEngine::new()),
			federation_upstream_url: None,
			service_name: "catalogue-coordinator".to_string(),
		})
	}

	#[tokio::test]
	async fn health_returns_200() {
		let state = test_state();
		let req = Request::builder()
			.method(Method::GET)
			.uri("/health")
			.body(Body::empty())
			.unwrap();
		let resp = route(state, req).await.unwrap();
		assert_eq!(resp.status(), hyper::StatusCode::OK);
	}

	#[tokio::test]
	async fn missing_query_is_bad_request() {
		let state = test_state();
		let req = Request::builder()
			.method(Method::POST)
			.uri("/sparql")
			.header("content-type", "application/json")
			.body(Body::from("{}"))
			.unwrap();
		let err = route(state, req).await.unwrap_err();
		assert_eq!(err.status_code(), hyper::StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn missing_offerings_id_is_bad_request() {
		let state = test_state();
		let req = Request::builder()
			.method(Method::POST)
			.uri("/offerings")
			.header("content-type", "application/json")
			.body(Body::from("{}"))
			.unwrap();
		let err = route(state, req).await.unwrap_err();
		assert_eq!(err.status_code(), hyper::StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn unknown_offering_is_not_found() {
		let state = test_state();
		let req = Request::builder()
			.method(Method::GET)
			.uri("/offerings/status/does-not-exist")
			.body(Body::empty())
			.unwrap();
		let err = route(state, req).await.unwrap_err();
		assert_eq!(err.status_code(), hyper::StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn unknown_route_is_not_found() {
		let state = test_state();
		let req = Request::builder()
			.method(Method::GET)
			.uri("/nope")
			.body(Body::empty())
			.unwrap();
		let err = route(state, req).await.unwrap_err();
		assert_eq!(err.status_code(), hyper::StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn malformed_sparql_error_body_matches_contract() {
		let state = test_state();
		let req = Request::builder()
			.method(Method::POST)
			.uri("/sparql")
			.header("content-type", "application/json")
			.body(Body::from("{}"))
			.unwrap();
		let resp = serve(state, req).await.unwrap();
		assert_eq!(resp.status(), hyper::StatusCode::BAD_REQUEST);
		let bytes = to_bytes(resp.into_body()).await.unwrap();
		let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
		assert_eq!(body["error"], "No query provided");
	}
}
