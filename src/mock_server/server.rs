//! Mock MOLGENIS server.
//!
//! Provides an axum-based HTTP server that simulates the MOLGENIS REST API.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::fixtures::{DefaultScenario, Fixtures};
use super::handlers;
use super::state::MockState;

/// A mock MOLGENIS server for testing.
///
/// The server runs in the background and can be used to test a [`Session`](crate::Session)
/// against a stateful implementation of the API.
pub struct MockServer {
    /// The URL where the server is listening.
    url: String,
    /// Handle to the server task.
    handle: JoinHandle<()>,
    /// Shared state that can be modified during tests.
    state: Arc<RwLock<MockState>>,
}

impl MockServer {
    /// Start a new mock server with the default tables and an `admin` user.
    ///
    /// The server listens on a random available port and returns immediately.
    pub async fn start() -> Self {
        Self::with_state(Self::default_state()).await
    }

    /// Start a mock server with empty state.
    pub async fn start_empty() -> Self {
        Self::with_state(MockState::new()).await
    }

    /// Start a mock server with custom state.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn with_state(state: MockState) -> Self {
        let shared_state = state.shared();
        let app = Self::create_router(shared_state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let addr = listener.local_addr().expect("Failed to get local address");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "mock server stopped");
            }
        });

        Self {
            url: format!("http://{addr}/"),
            handle,
            state: shared_state,
        }
    }

    /// Base URL of the server, suitable for [`Session::new`](crate::Session::new).
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get access to the server's shared state.
    pub fn state(&self) -> Arc<RwLock<MockState>> {
        self.state.clone()
    }

    /// Shutdown the server. Safe to call once the server is no longer needed.
    pub async fn shutdown(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }

    fn default_state() -> MockState {
        Self::state_from_scenario(Fixtures::default_scenario()).with_user("admin", "admin")
    }

    fn state_from_scenario(scenario: DefaultScenario) -> MockState {
        scenario
            .tables
            .into_iter()
            .fold(MockState::new(), |state, (meta, rows)| state.with_table(meta, rows))
    }

    /// Create the axum router with all routes.
    pub(crate) fn create_router(state: Arc<RwLock<MockState>>) -> Router {
        Router::new()
            // Session
            .route("/api/v1/login", post(handlers::login))
            .route("/api/v1/logout", post(handlers::logout))
            // Metadata
            .route("/api/v1/:entity/meta", get(handlers::get_entity_meta))
            .route(
                "/api/v1/:entity/meta/:attribute",
                get(handlers::get_attribute_meta),
            )
            .route("/api/metadata/:entity", get(handlers::get_entity_type))
            // Rows, v1
            .route(
                "/api/v1/:entity",
                post(handlers::add_row).delete(handlers::delete_all_rows),
            )
            .route("/api/v1/:entity/:id", delete(handlers::delete_row))
            .route(
                "/api/v1/:entity/:id/:attribute",
                put(handlers::update_attribute),
            )
            // Rows, v2
            .route(
                "/api/v2/:entity",
                get(handlers::list_rows)
                    .post(handlers::add_rows)
                    .put(handlers::update_rows)
                    .delete(handlers::delete_rows),
            )
            .route("/api/v2/:entity/:id", get(handlers::get_row))
            // Import
            .route(
                "/plugin/importwizard/importFile",
                post(handlers::import_file),
            )
            // Health check
            .route("/health", get(health_check))
            .with_state(state)
    }
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "ok"
}
