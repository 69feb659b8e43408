//! Key/value store key helpers. One function per key shape in the placement
//! record table; every crate that touches the KV store goes through these
//! instead of formatting keys itself.

pub const ALL_NODES: &str = "all_nodes";
pub const HASH_RING: &str = "hash_ring";

pub fn node(owner: &str) -> String {
	format!("node:{}", owner)
}

pub fn offering(id: &str) -> String {
	format!("offering:{}", id)
}

pub fn offering_node(id: &str) -> String {
	format!("offering_node:{}", id)
}

pub fn node_offerings(owner: &str) -> String {
	format!("node_offerings:{}", owner)
}
