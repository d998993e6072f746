//! MOLGENIS REST API client library.
//!
//! A Rust library for reading and writing MOLGENIS entity types: paginated
//! reads with RSQL filters, single and bulk row operations, metadata
//! retrieval, conversion of fetched rows back into uploadable form, and bulk
//! imports through the import wizard.
//!
//! # Quick Start
//!
//! ```no_run
//! use molgenis_client::{QueryOptions, Session, SortOrder};
//!
//! #[tokio::main]
//! async fn main() -> molgenis_client::Result<()> {
//!     let mut session = Session::new("http://localhost:8080/")?;
//!     session.login("admin", "admin").await?;
//!
//!     // All rows, fetched in batches of 1000
//!     let options = QueryOptions::new()
//!         .with_filter("age=gt=18")
//!         .with_expand("mother")
//!         .with_sort_order("age", SortOrder::Desc)
//!         .with_page_size(1000);
//!     let adults = session.get("Person", &options, None).await?;
//!     println!("Found {} adults", adults.len());
//!
//!     // Same rows, with references reduced to identifiers
//!     let uploadable = session.to_upload_format("Person", &adults).await?;
//!     session.upsert("Person", &uploadable).await?;
//!
//!     session.logout().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! All operations are methods on [`Session`], grouped by module:
//!
//! - [`query`] - [`QueryOptions`] and the v2 URL builder
//! - `pagination` - batched reads following continuation links
//! - `rows` - create, update and delete, plus [`Session::upsert`]
//! - `metadata` - v1 and metadata API entity type descriptions
//! - `upload` - conversion of fetched rows into uploadable form
//! - `import` - zip/CSV bulk import and import run polling
//!
//! Requests are issued one at a time; no operation runs requests
//! concurrently and nothing is retried automatically.

mod client;
mod config;
mod error;
mod import;
mod metadata;
mod pagination;
pub mod query;
mod rows;
mod traits;
mod upload;

#[cfg(feature = "test-server")]
pub mod mock_server;

/// A row: attribute name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

// Re-export core types
pub use client::{Session, TOKEN_HEADER};
pub use config::{resolve_urls, SessionConfig, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT};
pub use error::{MolgenisError, Result};
pub use pagination::{continuation_start, Page};
pub use query::{build_api_url, Filter, QueryOptions, Sort, SortOrder, DEFAULT_PAGE_SIZE};

// Re-export traits
pub use traits::Get;

// Re-export models
pub use import::{
    build_archive, import_run_id, ArchiveTable, ImportDataAction, ImportMetadataAction,
    ImportRun, ImportStatus, IMPORT_RUN_ENTITY,
};
pub use metadata::{
    Attribute, AttributeMeta, EntityMeta, EntityType, FieldType, RefEntityLink, RefEntityType,
};
pub use rows::{FileAttachment, UpsertSummary};
pub use upload::{reference_id_attributes, to_uploadable, BOOKKEEPING_FIELDS};
