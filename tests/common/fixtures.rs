//! Shared fixtures for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Keeping helpers under `tests/common/` avoids an extra test
//! binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/fixtures.rs"]
//! mod fixtures;
//! ```

#![allow(dead_code, reason = "each test binary uses a different subset")]

use stratus::{Catalog, CatalogStore, MemoryStore, load_catalog};
use stratus::storage::{DEFAULT_STREAM_VERSION, unsigned_index_path};
use stratus::test_support::use_test_image_data;

/// Region the fixture index serves.
pub const TEST_REGION: &str = "some-region";

/// Endpoint recorded alongside [`TEST_REGION`].
pub const TEST_ENDPOINT: &str = "https://example.com";

/// Controller API port used by global group scenarios.
pub const API_PORT: u16 = 17070;

/// Store index path for the default stream version.
pub fn index_path() -> String {
    unsigned_index_path(DEFAULT_STREAM_VERSION, 1)
}

/// Memory store populated with the fixture catalog.
pub fn published_store() -> MemoryStore {
    let store = MemoryStore::new();
    use_test_image_data(&store, TEST_REGION, TEST_ENDPOINT)
        .unwrap_or_else(|err| panic!("publish fixture catalog: {err}"));
    store
}

/// Loads the fixture catalog for `region` from `store`.
pub fn load(store: &dyn CatalogStore, region: &str) -> Catalog {
    load_catalog(store, &index_path(), region)
        .unwrap_or_else(|err| panic!("load catalog for {region}: {err}"))
}
