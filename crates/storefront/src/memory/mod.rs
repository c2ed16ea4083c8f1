//! In-process backend.
//!
//! Same observable semantics as the hosted services: atomic batches, merge
//! and update writes, array transforms, unique emails. Used by the test
//! suites and by `am-cli --offline`.

mod auth;
mod store;

pub use auth::MemoryAuth;
pub use store::MemoryStore;
