//! Shared harness for the server integration tests.

pub mod fixtures;
pub mod metadata;
pub mod server;

#[allow(unused_imports)]
pub use fixtures::{
    ADMIN_SECRET, FakeDutySource, FakeSource, duty, raw_cert, raw_cert_bad_expiry, sha256_hash,
};
#[allow(unused_imports)]
pub use metadata::{PostgresTestMetadata, TestMetadata, postgres_or_skip, run_metadata_test_both};
#[allow(unused_imports)]
pub use server::*;
