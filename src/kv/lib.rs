//! A narrow key/value interface over a networked in-memory store, with an
//! in-process fallback carrying the same semantics for when the backend is
//! unreachable.

mod glob;
pub mod mem;
pub mod redis_kv;
mod store;

pub use store::{Kv, KvStore};
