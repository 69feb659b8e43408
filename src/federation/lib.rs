//! Answers one SPARQL query by delegating to every live catalogue node and
//! merging the results, or by rewriting it into a single `SERVICE`-union
//! query forwarded to an upstream federation endpoint.

use std::time::Duration;

use coord_util::error::Error;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const FEDERATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct SparqlResults {
	pub head: Head,
	pub results: Bindings,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Head {
	pub vars: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Bindings {
	pub bindings: Vec<Value>,
}

/// Pulls the SELECT projection out of a query via regex, for `head.vars`
/// when the engine fans out rather than forwarding a single upstream
/// response that already carries its own `head`.
pub fn extract_projection(query: &str) -> Vec<String> {
	let re = Regex::new(r"(?is)SELECT\s+(?:DISTINCT\s+)?(.*?)\s+WHERE").unwrap();
	let vars = match re.captures(query) {
		Some(caps) => caps.get(1).map(|m| m.as_str().to_string()),
		None => None,
	};
	match vars {
		Some(v) if v.trim() == "*" => Vec::new(),
		Some(v) => v
			.split_whitespace()
			.filter(|t| t.starts_with('?') || t.starts_with('$'))
			.map(|t| t.trim_start_matches(['?', '$']).to_string())
			.collect(),
		None => Vec::new(),
	}
}

/// Locates the first balanced `{ ... }` block at or after the `WHERE`
/// keyword (or the first block in the query for ASK/CONSTRUCT/DESCRIBE
/// forms with no explicit `WHERE`). Returns `(prefix, body)` where `prefix`
/// is everything before the opening brace and `body` is the block's
/// contents without the enclosing braces.
pub fn split_where_block(query: &str) -> Option<(String, String)> {
	let where_re = Regex::new(r"(?i)\bWHERE\b").unwrap();
	let search_from = where_re
		.find(query)
		.map(|m| m.end())
		.unwrap_or(0);

	let open = query[search_from..].find('{')? + search_from;
	let bytes = query.as_bytes();
	let mut depth = 0i32;
	let mut close = None;
	for (i, &b) in bytes.iter().enumerate().skip(open) {
		match b {
			b'{' => depth += 1,
			b'}' => {
				depth -= 1;
				if depth == 0 {
					close = Some(i);
					break;
				}
			}
			_ => {}
		}
	}
	let close = close?;
	let prefix = query[..open].to_string();
	let body = query[open + 1..close].to_string();
	Some((prefix, body))
}

pub struct FederationEngine {
	http: reqwest::Client,
}

impl Default for FederationEngine {
	fn default() -> Self {
		Self::new()
	}
}

impl FederationEngine {
	pub fn new() -> Self {
		FederationEngine {
			http: reqwest::Client::builder()
				.timeout(FEDERATION_TIMEOUT)
				.build()
				.expect("failed to build http client"),
		}
	}

	/// POSTs the query to every live node and concatenates bindings. A node
	/// that errors or times out contributes an empty list, never fails the
	/// whole query. Empty `node_urls` is the caller's signal that there were
	/// no live nodes at all, which maps to an HTTP 500 at the API boundary.
	pub async fn fan_out_merge(&self, query: &str, node_urls: &[String]) -> SparqlResults {
		let requests = node_urls.iter().map(|url| {
			let http = &self.http;
			async move {
				let resp = http
					.post(format!("{}/sparql", url))
					.header("Accept", "application/sparql-results+json")
					.json(&serde_json::json!({ "query": query }))
					.send()
					.await;
				match resp {
					Ok(r) if r.status().is_success() => {
						r.json::<SparqlResults>().await.unwrap_or_default().results.bindings
					}
					Ok(r) => {
						tracing::warn!("node {} returned {}", url, r.status());
						Vec::new()
					}
					Err(e) => {
						tracing::warn!("node {} unreachable: {}", url, e);
						Vec::new()
					}
				}
			}
		});

		let per_node_bindings = futures::future::join_all(requests).await;
		let bindings: Vec<Value> = per_node_bindings.into_iter().flatten().collect();

		SparqlResults {
			head: Head {
				vars: extract_projection(query),
			},
			results: Bindings { bindings },
		}
	}

	/// Rewrites `query`'s WHERE block into a UNION of per-node `SERVICE`
	/// clauses and forwards the rewritten query to a single upstream
	/// federation endpoint, passing its response through verbatim.
	pub async fn rewrite_and_forward(
		&self,
		query: &str,
		node_urls: &[String],
		upstream_url: &str,
	) -> Result<(u16, String, bytes::Bytes), Error> {
		let (prefix, body) = split_where_block(query)
			.ok_or_else(|| Error::BadRequest("could not locate WHERE block".to_string()))?;

		let services: Vec<String> = node_urls
			.iter()
			.map(|url| format!("SERVICE <{}/sparql> {{ {} }}", url, body))
			.collect();
		let rewritten = format!("{} WHERE {{ {} }}", prefix.trim_end(), services.join(" UNION "));

		let resp = self
			.http
			.post(upstream_url)
			.header("Content-Type", "application/sparql-query")
			.body(rewritten)
			.send()
			.await
			.map_err(|e| Error::Http(format!("upstream federation endpoint: {}", e)))?;

		let status = resp.status().as_u16();
		let content_type = resp
			.headers()
			.get("content-type")
			.and_then(|v| v.to_str().ok())
			.unwrap_or("application/sparql-results+json")
			.to_string();
		let body = resp
			.bytes()
			.await
			.map_err(|e| Error::Http(format!("reading upstream response: {}", e)))?;

		Ok((status, content_type, body))
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn extracts_simple_projection() {
		let q = "SELECT ?x ?y WHERE { ?x ?p ?y }";
		assert_eq!(extract_projection(q), vec!["x".to_string(), "y".to_string()]);
	}

	#[test]
	fn extracts_projection_with_distinct() {
		let q = "SELECT DISTINCT ?x WHERE { ?x a ?t }";
		assert_eq!(extract_projection(q), vec!["x".to_string()]);
	}

	#[test]
	fn star_projection_is_empty() {
		let q = "SELECT * WHERE { ?x ?p ?y }";
		assert!(extract_projection(q).is_empty());
	}

	#[test]
	fn splits_nested_where_block() {
		let q = "SELECT ?x WHERE { ?x a ?t . { ?x ?p ?y } }";
		let (prefix, body) = split_where_block(q).unwrap();
		assert_eq!(prefix.trim(), "SELECT ?x");
		assert_eq!(body.trim(), "?x a ?t . { ?x ?p ?y }");
	}
}
