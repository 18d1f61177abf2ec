//! Common test infrastructure
//!
//! Fixtures for a small catalog on disk, stub collaborators for the
//! enrichment worker and a review server bound to a random local port.
//! Tests should only import from this module, not from internal submodules.

mod fixtures;
mod server;
mod stubs;

#[allow(unused_imports)]
pub use fixtures::{catalog_csv, CatalogFixtureRow, TestWorkspace};
#[allow(unused_imports)]
pub use server::TestServer;
#[allow(unused_imports)]
pub use stubs::{RecordingSleeper, StubFetcher, StubOracle};
