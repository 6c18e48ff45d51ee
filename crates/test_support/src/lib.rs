//! Test helpers shared by nagoyameshi integration tests.
//!
//! Tests call [`database::TestDatabase::start`] to get a pool backed by a
//! throwaway Postgres container with the service schema applied. When no
//! container runtime is reachable the call fails and the test is expected to
//! return early instead of failing.

pub mod database;
pub mod postgres;
pub mod runtime;

use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TestNetwork {
    name: String,
}

impl TestNetwork {
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            name: unique_name(prefix),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) fn unique_name(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}
