//! Conversion of fetched rows into their uploadable form.
//!
//! Rows read from the v2 API embed referenced rows as objects and carry
//! `_href`/`_meta` bookkeeping fields. The server expects references as bare
//! identifiers when rows are written back, so [`to_uploadable`] replaces each
//! embedded reference with the value of its identifier attribute.

use std::collections::HashMap;

use serde_json::Value;

use crate::client::Session;
use crate::error::{MolgenisError, Result};
use crate::metadata::EntityType;
use crate::pagination::Page;
use crate::query::QueryOptions;
use crate::Row;

/// Fields added by the server that are not part of the data.
pub const BOOKKEEPING_FIELDS: [&str; 2] = ["_href", "_meta"];

/// Map each reference attribute to the identifier attribute of its target.
///
/// `meta` must have been fetched with reference expansion. Every target must
/// declare exactly one identifier attribute.
pub fn reference_id_attributes(meta: &EntityType) -> Result<HashMap<String, String>> {
    let mut ref_ids = HashMap::new();

    for attribute in &meta.attributes {
        let Some(target) = &attribute.ref_entity_type else {
            continue;
        };

        let ref_entity = target.entity_type_id().unwrap_or_default().to_string();
        let id_attributes = target
            .expanded()
            .map(EntityType::id_attributes)
            .unwrap_or_default();

        match id_attributes.as_slice() {
            [id_attribute] => {
                ref_ids.insert(attribute.name.clone(), id_attribute.name.clone());
            }
            other => {
                return Err(MolgenisError::AmbiguousReferenceIdentifier {
                    attribute: attribute.name.clone(),
                    ref_entity,
                    found: other.len(),
                })
            }
        }
    }

    Ok(ref_ids)
}

/// Convert rows to their uploadable form.
///
/// The input rows are left untouched; converted copies are returned in the
/// same order. Bookkeeping fields are dropped, embedded single references
/// become their identifier and lists of embedded references become lists of
/// identifiers. Values that are already identifiers pass through, so applying
/// the conversion twice gives the same result.
///
/// # Errors
///
/// Returns [`MolgenisError::AmbiguousReferenceIdentifier`] when a referenced
/// entity type has zero or several identifier attributes, and
/// [`MolgenisError::MissingReferenceIdentifier`] when an embedded reference
/// lacks its identifier value.
pub fn to_uploadable(meta: &EntityType, rows: &[Row]) -> Result<Vec<Row>> {
    let ref_ids = reference_id_attributes(meta)?;
    rows.iter().map(|row| convert_row(&ref_ids, row)).collect()
}

fn convert_row(ref_ids: &HashMap<String, String>, row: &Row) -> Result<Row> {
    let mut converted = Row::new();

    for (name, value) in row {
        if BOOKKEEPING_FIELDS.contains(&name.as_str()) {
            continue;
        }

        let value = match ref_ids.get(name) {
            Some(id_attribute) => reference_to_id(name, id_attribute, value)?,
            None => value.clone(),
        };
        converted.insert(name.clone(), value);
    }

    Ok(converted)
}

fn reference_to_id(attribute: &str, id_attribute: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Object(_) => embedded_id(attribute, id_attribute, value),
        Value::Array(refs) if !refs.is_empty() => refs
            .iter()
            .map(|r| embedded_id(attribute, id_attribute, r))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        _ => Ok(value.clone()),
    }
}

fn embedded_id(attribute: &str, id_attribute: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Object(object) => object.get(id_attribute).cloned().ok_or_else(|| {
            MolgenisError::MissingReferenceIdentifier {
                attribute: attribute.to_string(),
                id_attribute: id_attribute.to_string(),
            }
        }),
        scalar => Ok(scalar.clone()),
    }
}

impl Session {
    /// Convert rows of an entity type to their uploadable form.
    ///
    /// Fetches the expanded metadata once per call; see [`to_uploadable`].
    #[tracing::instrument(skip(self, rows), fields(rows = rows.len()))]
    pub async fn to_upload_format(&self, entity: &str, rows: &[Row]) -> Result<Vec<Row>> {
        let meta = self.get_meta(entity, true, true).await?;
        to_uploadable(&meta, rows)
    }

    /// Retrieve rows in uploadable form.
    pub async fn get_uploadable(
        &self,
        entity: &str,
        options: &QueryOptions,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        let rows = self.get(entity, options, limit).await?;
        self.to_upload_format(entity, &rows).await
    }

    /// Retrieve a single page and convert its rows to uploadable form.
    pub async fn get_page_uploadable(&self, entity: &str, options: &QueryOptions) -> Result<Page> {
        let mut page = self.get_page(entity, options).await?;
        page.items = self.to_upload_format(entity, &page.items).await?;
        Ok(page)
    }
}
