//! Get trait for fetching single typed entities.

use async_trait::async_trait;

use crate::client::Session;
use crate::error::Result;

/// Fetch a single typed entity by ID.
///
/// Implemented by the system entities this crate models, such as
/// [`ImportRun`](crate::ImportRun) and [`EntityMeta`](crate::EntityMeta).
/// Untyped rows are read with [`Session::get_by_id`].
///
/// # Example
///
/// ```ignore
/// use molgenis_client::{Get, ImportRun, Session};
///
/// let session = Session::with_token("http://localhost:8080", "token")?;
/// let run = ImportRun::get(&session, "aaaac3bv5rh7kutemh4bmxyaae".to_string()).await?;
/// println!("{:?}", run.status);
/// ```
#[async_trait]
pub trait Get: Sized {
    /// The ID type for this entity.
    type Id;

    /// Fetch the entity by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not found or the request fails.
    async fn get(session: &Session, id: Self::Id) -> Result<Self>;
}
