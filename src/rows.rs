//! Row-level create, read, update and delete operations.

use std::collections::HashSet;

use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::client::{segment, Session};
use crate::error::{MolgenisError, Result};
use crate::query::{build_api_url, QueryOptions};
use crate::Row;

/// Page size used when collecting existing identifiers for an upsert.
const UPSERT_ID_PAGE_SIZE: u32 = 10_000;

/// A file to upload as a file attribute value.
#[derive(Debug, Clone)]
pub struct FileAttachment {
    /// Name of the file attribute.
    pub attribute: String,
    /// File name reported to the server.
    pub file_name: String,
    /// File contents.
    pub content: Vec<u8>,
}

impl FileAttachment {
    pub fn new(
        attribute: impl Into<String>,
        file_name: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            file_name: file_name.into(),
            content: content.into(),
        }
    }
}

/// Outcome of [`Session::upsert`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    /// Identifiers of the added rows, in input order.
    pub added: Vec<String>,
    /// Number of rows sent as updates.
    pub updated: usize,
}

#[derive(Serialize)]
struct EntitiesBody<'a> {
    entities: &'a [Row],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntityIdsBody<'a> {
    entity_ids: &'a [String],
}

#[derive(Deserialize)]
struct CreatedResources {
    resources: Vec<CreatedResource>,
}

#[derive(Deserialize)]
struct CreatedResource {
    href: String,
}

/// Last path segment of an href, e.g. the row id of `/api/v2/Person/ann`.
pub(crate) fn last_segment(href: &str) -> &str {
    href.trim_end_matches('/').rsplit('/').next().unwrap_or(href)
}

/// Comparable form of an identifier value.
fn id_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a JSON value as a form field.
fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items.iter().map(form_value).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

impl Session {
    /// Retrieve a single row by identifier.
    ///
    /// `attributes` and `expand` are comma-separated attribute lists.
    #[tracing::instrument(skip(self))]
    pub async fn get_by_id(
        &self,
        entity: &str,
        id: &str,
        attributes: Option<&str>,
        expand: Option<&str>,
    ) -> Result<Row> {
        let mut options = QueryOptions::new();
        if let Some(attributes) = attributes {
            options = options.with_attributes(attributes);
        }
        if let Some(expand) = expand {
            options = options.with_expand(expand);
        }

        let base = self
            .api_url()
            .join(&format!("v2/{}/{}", segment(entity), segment(id)))?;
        let url = Url::parse(&build_api_url(base.as_str(), &options))?;

        let response = self.send(self.request_url(Method::GET, url)).await?;
        response.json().await.map_err(MolgenisError::HttpError)
    }

    /// Retrieve a single row by identifier in uploadable form.
    pub async fn get_by_id_uploadable(
        &self,
        entity: &str,
        id: &str,
        attributes: Option<&str>,
        expand: Option<&str>,
    ) -> Result<Row> {
        let row = self.get_by_id(entity, id, attributes, expand).await?;
        let mut rows = self.to_upload_format(entity, std::slice::from_ref(&row)).await?;
        rows.pop()
            .ok_or_else(|| MolgenisError::InvalidResponse("empty conversion result".to_string()))
    }

    /// Add a single row and return its identifier.
    #[tracing::instrument(skip(self, data))]
    pub async fn add(&self, entity: &str, data: &Row) -> Result<String> {
        let path = format!("v1/{}", segment(entity));
        let response = self
            .send(self.request_json(Method::POST, &path, data)?)
            .await?;
        Self::created_id(&response)
    }

    /// Add a single row with file attribute values.
    ///
    /// Non-file values are sent as form fields; lists are comma-joined.
    #[tracing::instrument(skip(self, data, files), fields(files = files.len()))]
    pub async fn add_with_files(
        &self,
        entity: &str,
        data: &Row,
        files: Vec<FileAttachment>,
    ) -> Result<String> {
        let mut form = Form::new();
        for (name, value) in data {
            form = form.text(name.clone(), form_value(value));
        }
        for file in files {
            form = form.part(file.attribute, Part::bytes(file.content).file_name(file.file_name));
        }

        let path = format!("v1/{}", segment(entity));
        let response = self
            .send(self.request(Method::POST, &path)?.multipart(form))
            .await?;
        Self::created_id(&response)
    }

    fn created_id(response: &reqwest::Response) -> Result<String> {
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| MolgenisError::InvalidResponse("missing Location header".to_string()))?;
        Ok(last_segment(location).to_string())
    }

    /// Add rows in one request and return their identifiers.
    #[tracing::instrument(skip(self, entities), fields(rows = entities.len()))]
    pub async fn add_all(&self, entity: &str, entities: &[Row]) -> Result<Vec<String>> {
        let path = format!("v2/{}", segment(entity));
        let response = self
            .send(self.request_json(Method::POST, &path, &EntitiesBody { entities })?)
            .await?;
        let created: CreatedResources = response.json().await.map_err(MolgenisError::HttpError)?;

        Ok(created
            .resources
            .iter()
            .map(|r| last_segment(&r.href).to_string())
            .collect())
    }

    /// Set one attribute of one row.
    #[tracing::instrument(skip(self, value))]
    pub async fn update_one(
        &self,
        entity: &str,
        id: &str,
        attribute: &str,
        value: &Value,
    ) -> Result<()> {
        let path = format!(
            "v1/{}/{}/{}",
            segment(entity),
            segment(id),
            segment(attribute)
        );
        self.send(self.request_json(Method::PUT, &path, value)?)
            .await?;
        Ok(())
    }

    /// Update rows in one request. Each row must contain its identifier.
    #[tracing::instrument(skip(self, entities), fields(rows = entities.len()))]
    pub async fn update_all(&self, entity: &str, entities: &[Row]) -> Result<()> {
        let path = format!("v2/{}", segment(entity));
        self.send(self.request_json(Method::PUT, &path, &EntitiesBody { entities })?)
            .await?;
        Ok(())
    }

    /// Delete one row, or every row of the entity type when `id` is `None`.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, entity: &str, id: Option<&str>) -> Result<()> {
        let path = match id {
            Some(id) => format!("v1/{}/{}", segment(entity), segment(id)),
            None => format!("v1/{}", segment(entity)),
        };
        self.send(self.request(Method::DELETE, &path)?).await?;
        Ok(())
    }

    /// Delete rows by identifier in one request.
    #[tracing::instrument(skip(self, entity_ids), fields(rows = entity_ids.len()))]
    pub async fn delete_list(&self, entity: &str, entity_ids: &[String]) -> Result<()> {
        let path = format!("v2/{}", segment(entity));
        self.send(self.request_json(Method::DELETE, &path, &EntityIdsBody { entity_ids })?)
            .await?;
        Ok(())
    }

    /// Add new rows and update existing ones.
    ///
    /// A row is an update when its identifier already exists on the server,
    /// and an add otherwise (including rows without an identifier). One-to-many
    /// attributes are removed from added rows because the server rejects them
    /// on create. Adds are sent before updates; empty batches are skipped.
    #[tracing::instrument(skip(self, entities), fields(rows = entities.len()))]
    pub async fn upsert(&self, entity: &str, entities: &[Row]) -> Result<UpsertSummary> {
        let meta = self.get_entity_meta_data(entity).await?;
        let id_attribute = meta.id_attribute.clone().ok_or_else(|| {
            MolgenisError::InvalidResponse(format!("entity type '{entity}' has no idAttribute"))
        })?;

        let options = QueryOptions::new()
            .with_attributes(&id_attribute)
            .with_page_size(UPSERT_ID_PAGE_SIZE);
        let existing: HashSet<String> = self
            .get(entity, &options, None)
            .await?
            .iter()
            .filter_map(|row| row.get(&id_attribute).map(id_key))
            .collect();

        let (update, add): (Vec<&Row>, Vec<&Row>) = entities.iter().partition(|row| {
            row.get(&id_attribute)
                .is_some_and(|id| existing.contains(&id_key(id)))
        });

        let one_to_manys = meta.one_to_many_attributes();
        let add: Vec<Row> = add
            .into_iter()
            .map(|row| {
                let mut row = row.clone();
                for attribute in &one_to_manys {
                    row.remove(*attribute);
                }
                row
            })
            .collect();
        let update: Vec<Row> = update.into_iter().cloned().collect();

        tracing::debug!(add = add.len(), update = update.len(), "upsert partitioned");

        let mut summary = UpsertSummary::default();
        if !add.is_empty() {
            summary.added = self.add_all(entity, &add).await?;
        }
        if !update.is_empty() {
            self.update_all(entity, &update).await?;
            summary.updated = update.len();
        }
        Ok(summary)
    }
}
