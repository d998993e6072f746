//! Mock MOLGENIS server for E2E testing.
//!
//! This module provides an in-memory mock server that simulates the MOLGENIS
//! REST API for integration and end-to-end testing. Unlike wiremock, which
//! mocks at the HTTP level per test, this server keeps tables, tokens and
//! import runs across requests.
//!
//! # Example
//!
//! ```ignore
//! use molgenis_client::mock_server::MockServer;
//! use molgenis_client::{QueryOptions, Session};
//!
//! #[tokio::test]
//! async fn test_workflow() {
//!     let server = MockServer::start().await;
//!     let mut session = Session::new(server.url()).unwrap();
//!     session.login("admin", "admin").await.unwrap();
//!
//!     let pets = session.get("Pet", &QueryOptions::new(), None).await.unwrap();
//!     assert_eq!(pets.len(), 2);
//!
//!     server.shutdown().await;
//! }
//! ```

mod fixtures;
mod handlers;
mod server;
mod state;

pub use fixtures::{DefaultScenario, Fixtures};
pub use server::MockServer;
pub use state::{BulkRequest, MockImportRun, MockState, MockTable, MockUpload};
