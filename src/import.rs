//! Bulk import through the import wizard.
//!
//! Data is packaged as a zip archive with one quoted CSV file per table,
//! uploaded to `plugin/importwizard/importFile`, and processed by the server
//! as an import run (`sys_ImportRun`) that the client polls until it leaves
//! the RUNNING state.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Cursor, Write};
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::Session;
use crate::error::{MolgenisError, Result};
use crate::rows::last_segment;
use crate::traits::Get;
use crate::Row;

/// Entity type that tracks import runs.
pub const IMPORT_RUN_ENTITY: &str = "sys_ImportRun";

const IMPORT_RUN_ATTRIBUTES: &str = "id,status,message,startDate,endDate,progress,username";

/// How rows in the archive are merged with existing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportDataAction {
    /// Add rows; fail on existing identifiers.
    #[default]
    Add,
    /// Add new rows and update existing ones.
    AddUpdateExisting,
    /// Update existing rows; fail on unknown identifiers.
    Update,
    /// Add new rows and leave existing ones untouched.
    AddIgnoreExisting,
}

impl ImportDataAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::AddUpdateExisting => "add_update_existing",
            Self::Update => "update",
            Self::AddIgnoreExisting => "add_ignore_existing",
        }
    }
}

impl fmt::Display for ImportDataAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportDataAction {
    type Err = MolgenisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Ok(Self::Add),
            "add_update_existing" => Ok(Self::AddUpdateExisting),
            "update" => Ok(Self::Update),
            "add_ignore_existing" => Ok(Self::AddIgnoreExisting),
            _ => Err(MolgenisError::InvalidAction(s.to_string())),
        }
    }
}

/// How entity type definitions in the archive are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMetadataAction {
    Add,
    Update,
    #[default]
    Upsert,
    Ignore,
}

impl ImportMetadataAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Upsert => "upsert",
            Self::Ignore => "ignore",
        }
    }
}

impl fmt::Display for ImportMetadataAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportMetadataAction {
    type Err = MolgenisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Ok(Self::Add),
            "update" => Ok(Self::Update),
            "upsert" => Ok(Self::Upsert),
            "ignore" => Ok(Self::Ignore),
            _ => Err(MolgenisError::InvalidAction(s.to_string())),
        }
    }
}

/// Status of an import run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStatus {
    Running,
    Finished,
    Failed,
    /// A status this client does not know; treated as terminal.
    Other(String),
}

impl ImportStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Other(s) => s,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ImportStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "RUNNING" => Self::Running,
            "FINISHED" => Self::Finished,
            "FAILED" => Self::Failed,
            _ => Self::Other(s),
        }
    }
}

impl Serialize for ImportStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ImportStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

/// A server-side import run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRun {
    #[serde(default)]
    pub id: Option<String>,

    pub status: ImportStatus,

    /// Progress or failure message.
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub progress: Option<u64>,

    #[serde(default)]
    pub username: Option<String>,
}

#[async_trait]
impl Get for ImportRun {
    type Id = String; // Import run id

    #[tracing::instrument(skip(session))]
    async fn get(session: &Session, id: String) -> Result<Self> {
        let row = session
            .get_by_id(IMPORT_RUN_ENTITY, &id, Some(IMPORT_RUN_ATTRIBUTES), None)
            .await?;
        let run = serde_json::from_value(Value::Object(row))?;
        Ok(run)
    }
}

/// Extract the import run id from the upload response, e.g.
/// `/api/v2/sys_ImportRun/aaaac3bv5rh7kutemh4bmxyaae`.
pub fn import_run_id(href: &str) -> &str {
    last_segment(href.trim())
}

/// Render one value as a CSV field.
///
/// List values are joined with commas. Elements that themselves contain a
/// comma cannot be told apart from separate elements on import.
fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(csv_field).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Write rows as a fully quoted CSV with the given header.
fn write_csv(table: &str, attributes: &[String], rows: &[Row]) -> Result<Vec<u8>> {
    if let Some(column) = rows
        .iter()
        .flat_map(|row| row.keys())
        .find(|key| !attributes.contains(*key))
    {
        return Err(MolgenisError::UnknownColumn {
            table: table.to_string(),
            column: column.clone(),
        });
    }

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());

    writer.write_record(attributes)?;
    for row in rows {
        writer.write_record(
            attributes
                .iter()
                .map(|name| row.get(name).map(csv_field).unwrap_or_default()),
        )?;
    }

    writer
        .into_inner()
        .map_err(|e| MolgenisError::Io(e.into_error()))
}

/// A table to include in an import archive.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveTable<'a> {
    /// Entity type id; becomes the `{name}.csv` entry name.
    pub name: &'a str,
    /// Column order, normally the entity type's attribute order.
    pub attributes: &'a [String],
    pub rows: &'a [Row],
}

/// Build a zip archive with one CSV entry per table.
pub fn build_archive(tables: &[ArchiveTable<'_>]) -> Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for table in tables {
        let csv = write_csv(table.name, table.attributes, table.rows)?;
        zip.start_file(format!("{}.csv", table.name), options)?;
        zip.write_all(&csv)?;
    }

    Ok(zip.finish()?.into_inner())
}

impl Session {
    /// Upload an import archive.
    ///
    /// Returns the response text, which is the href of the import run.
    #[tracing::instrument(skip(self, archive), fields(bytes = archive.len()))]
    pub async fn upload_zip(
        &self,
        file_name: &str,
        archive: Vec<u8>,
        data_action: ImportDataAction,
        metadata_action: ImportMetadataAction,
    ) -> Result<String> {
        let url = self.root_url().join("plugin/importwizard/importFile")?;
        let part = Part::bytes(archive)
            .file_name(file_name.to_string())
            .mime_str("application/zip")?;
        let form = Form::new().part("file", part);

        let request = self
            .request_url(Method::POST, url)
            .query(&[
                ("action", data_action.as_str()),
                ("metadataAction", metadata_action.as_str()),
            ])
            .multipart(form);

        let response = self.send(request).await?;
        let href = response.text().await.map_err(MolgenisError::HttpError)?;
        tracing::info!(%href, "archive uploaded");
        Ok(href)
    }

    /// Upload an import archive from disk.
    pub async fn upload_zip_file(
        &self,
        path: impl AsRef<Path>,
        data_action: ImportDataAction,
        metadata_action: ImportMetadataAction,
    ) -> Result<String> {
        let path = path.as_ref();
        let archive = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("archive.zip");
        self.upload_zip(file_name, archive, data_action, metadata_action)
            .await
    }

    /// Upload an import archive and wait for the import run to finish.
    pub async fn upload_zip_and_wait(
        &self,
        file_name: &str,
        archive: Vec<u8>,
        data_action: ImportDataAction,
        metadata_action: ImportMetadataAction,
    ) -> Result<ImportRun> {
        let href = self
            .upload_zip(file_name, archive, data_action, metadata_action)
            .await?;
        self.await_import_job(import_run_id(&href)).await
    }

    /// Import rows for several tables in one import run.
    ///
    /// Each table's columns follow the attribute order of its entity type.
    #[tracing::instrument(skip(self, data), fields(tables = data.len()))]
    pub async fn import_data(
        &self,
        data: &BTreeMap<String, Vec<Row>>,
        data_action: ImportDataAction,
        metadata_action: ImportMetadataAction,
    ) -> Result<ImportRun> {
        let mut columns = Vec::with_capacity(data.len());
        for table in data.keys() {
            let meta = self.get_meta(table, false, false).await?;
            columns.push(meta.attribute_names());
        }

        let tables: Vec<ArchiveTable<'_>> = data
            .iter()
            .zip(&columns)
            .map(|((name, rows), attributes)| ArchiveTable {
                name,
                attributes,
                rows,
            })
            .collect();
        let archive = build_archive(&tables)?;

        self.upload_zip_and_wait("archive.zip", archive, data_action, metadata_action)
            .await
    }

    /// Poll an import run until it is no longer running.
    ///
    /// Waits the configured poll interval before every status check.
    ///
    /// # Errors
    ///
    /// Returns [`MolgenisError::ImportFailed`] with the server message when
    /// the run fails.
    #[tracing::instrument(skip(self))]
    pub async fn await_import_job(&self, job_id: &str) -> Result<ImportRun> {
        let mut checks = 0u32;
        loop {
            tokio::time::sleep(self.poll_interval()).await;
            let run = ImportRun::get(self, job_id.to_string()).await?;
            checks += 1;

            match run.status {
                ImportStatus::Running => {
                    tracing::debug!(checks, "import still running");
                }
                ImportStatus::Failed => {
                    let message = run.message.unwrap_or_default();
                    tracing::warn!(%message, "import failed");
                    return Err(MolgenisError::ImportFailed(message));
                }
                ref status => {
                    tracing::info!(%status, checks, "import done");
                    return Ok(run);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use serde_json::json;

    use super::*;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_actions_round_trip_strings() {
        assert_eq!(
            "add_update_existing".parse::<ImportDataAction>().unwrap(),
            ImportDataAction::AddUpdateExisting
        );
        assert_eq!(ImportMetadataAction::Ignore.to_string(), "ignore");
        assert_eq!(ImportDataAction::default(), ImportDataAction::Add);
        assert_eq!(ImportMetadataAction::default(), ImportMetadataAction::Upsert);
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        assert!(matches!(
            "merge".parse::<ImportDataAction>(),
            Err(MolgenisError::InvalidAction(a)) if a == "merge"
        ));
        assert!("drop".parse::<ImportMetadataAction>().is_err());
    }

    #[test]
    fn test_import_status_from_string() {
        assert_eq!(ImportStatus::from("RUNNING".to_string()), ImportStatus::Running);
        assert_eq!(ImportStatus::from("FAILED".to_string()), ImportStatus::Failed);
        assert_eq!(
            ImportStatus::from("CANCELLED".to_string()),
            ImportStatus::Other("CANCELLED".to_string())
        );
    }

    #[test]
    fn test_import_run_deserialize() {
        let run: ImportRun = serde_json::from_value(json!({
            "_href": "/api/v2/sys_ImportRun/abc",
            "id": "abc",
            "status": "FINISHED",
            "message": "Imported 2 rows",
            "startDate": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(run.status, ImportStatus::Finished);
        assert_eq!(run.message.as_deref(), Some("Imported 2 rows"));
        assert!(run.start_date.is_some());
        assert!(run.end_date.is_none());
    }

    #[test]
    fn test_import_run_id() {
        assert_eq!(import_run_id("/api/v2/sys_ImportRun/abc123\n"), "abc123");
    }

    #[test]
    fn test_write_csv_quotes_and_joins_lists() {
        let attributes = vec!["name".to_string(), "tags".to_string(), "weight".to_string()];
        let rows = vec![
            row(json!({"name": "Snuffy", "tags": ["brown", "canis"], "weight": 6.8})),
            row(json!({"name": "Rex"})),
        ];

        let csv = String::from_utf8(write_csv("Pet", &attributes, &rows).unwrap()).unwrap();
        assert_eq!(
            csv,
            "\"name\",\"tags\",\"weight\"\n\"Snuffy\",\"brown,canis\",\"6.8\"\n\"Rex\",\"\",\"\"\n"
        );
    }

    #[test]
    fn test_write_csv_rejects_unknown_column() {
        let attributes = vec!["name".to_string()];
        let rows = vec![row(json!({"name": "Rex", "color": "brown"}))];
        let err = write_csv("Pet", &attributes, &rows).unwrap_err();
        assert!(matches!(
            err,
            MolgenisError::UnknownColumn { ref table, ref column } if table == "Pet" && column == "color"
        ));
    }

    #[test]
    fn test_build_archive_has_one_entry_per_table() {
        let pet_attrs = vec!["name".to_string()];
        let tag_attrs = vec!["tag".to_string()];
        let pets = vec![row(json!({"name": "Rex"}))];
        let tags = vec![row(json!({"tag": "brown"}))];

        let bytes = build_archive(&[
            ArchiveTable { name: "Pet", attributes: &pet_attrs, rows: &pets },
            ArchiveTable { name: "Tag", attributes: &tag_attrs, rows: &tags },
        ])
        .unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut contents = String::new();
        archive
            .by_name("Tag.csv")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "\"tag\"\n\"brown\"\n");
    }
}
