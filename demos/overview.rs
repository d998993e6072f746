//! Overview of the MOLGENIS client.
//!
//! Run with:
//! ```
//! MOLGENIS_URL=http://localhost:8080 MOLGENIS_USERNAME=admin MOLGENIS_PASSWORD=admin \
//!     cargo run --example overview -- Person
//! ```

use molgenis_client::{EntityMeta, Get, QueryOptions, Session, SessionConfig};

#[tokio::main]
async fn main() -> molgenis_client::Result<()> {
    // Initialize tracing for debugging (optional)
    tracing_subscriber::fmt::init();

    let url = std::env::var("MOLGENIS_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let entity = std::env::args().nth(1).unwrap_or_else(|| "sys_sec_User".to_string());

    println!("Connecting to {url}...");
    let mut session = Session::from_config(SessionConfig::new(&url))?;
    if let (Ok(username), Ok(password)) = (
        std::env::var("MOLGENIS_USERNAME"),
        std::env::var("MOLGENIS_PASSWORD"),
    ) {
        session.login(&username, &password).await?;
        println!("Logged in as {username}");
    }

    // Describe the entity type
    println!("\n--- Metadata of {entity} ---");
    let meta = EntityMeta::get(&session, entity.clone()).await?;
    println!("Identifier: {}", meta.id_attribute.as_deref().unwrap_or("none"));
    for attribute in meta.attributes.values() {
        println!("  - {} ({})", attribute.name, attribute.field_type);
    }

    // Count rows without fetching them all
    let raw = session.get_raw(&entity, &QueryOptions::new().with_page_size(1)).await?;
    println!("\nTotal rows: {}", raw["total"]);

    // First rows, in uploadable form
    println!("\n--- First rows ---");
    let rows = session
        .get_uploadable(&entity, &QueryOptions::new().with_page_size(5), Some(5))
        .await?;
    for row in &rows {
        println!("  {}", serde_json::Value::Object(row.clone()));
    }

    if session.is_authenticated() {
        session.logout().await?;
    }
    Ok(())
}
