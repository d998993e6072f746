//! Import wizard handler.

use std::collections::VecDeque;
use std::io::{Cursor, Read};
use std::sync::Arc;

use axum::{
    extract::{Multipart, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::{authorize, error_response};
use crate::mock_server::state::{MockImportRun, MockState, MockUpload};
use crate::{FieldType, ImportStatus, Row, IMPORT_RUN_ENTITY};

/// Query parameters of an import request.
#[derive(Debug, Default, Deserialize)]
pub struct ImportQuery {
    pub action: Option<String>,
    #[serde(rename = "metadataAction")]
    pub metadata_action: Option<String>,
}

/// Convert a CSV cell into a typed value; empty cells are absent.
fn csv_value(field_type: FieldType, text: &str) -> Option<Value> {
    if text.is_empty() {
        return None;
    }
    Some(match field_type {
        FieldType::Int | FieldType::Long => text.parse::<i64>().map_or_else(|_| json!(text), |n| json!(n)),
        FieldType::Decimal => text.parse::<f64>().map_or_else(|_| json!(text), |n| json!(n)),
        FieldType::Bool => json!(text.eq_ignore_ascii_case("true")),
        t if t.is_multi_reference() => json!(text.split(',').collect::<Vec<_>>()),
        _ => json!(text),
    })
}

/// Read the tables of an archive as typed rows.
fn read_archive(state: &MockState, archive: &[u8]) -> Result<Vec<(String, Vec<Row>)>, String> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).map_err(|e| e.to_string())?;
    let mut tables = Vec::with_capacity(zip.len());

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| e.to_string())?;
        let Some(entity) = entry.name().strip_suffix(".csv").map(str::to_string) else {
            continue;
        };
        let table = state
            .table(&entity)
            .ok_or_else(|| format!("Unknown entity type [{entity}]"))?;

        let mut contents = String::new();
        entry
            .read_to_string(&mut contents)
            .map_err(|e| e.to_string())?;

        let mut reader = csv::Reader::from_reader(contents.as_bytes());
        let headers = reader.headers().map_err(|e| e.to_string())?.clone();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| e.to_string())?;
            let mut row = Row::new();
            for (name, text) in headers.iter().zip(record.iter()) {
                let field_type = table
                    .meta
                    .attribute(name)
                    .map(|a| a.field_type)
                    .ok_or_else(|| format!("Unknown attribute [{name}] of entity type [{entity}]"))?;
                if let Some(value) = csv_value(field_type, text) {
                    row.insert(name.to_string(), value);
                }
            }
            rows.push(row);
        }
        tables.push((entity, rows));
    }

    Ok(tables)
}

/// Apply imported rows according to the data action. Returns the number of
/// rows written.
fn apply_import(
    state: &mut MockState,
    tables: Vec<(String, Vec<Row>)>,
    action: &str,
) -> Result<usize, String> {
    let mut written = 0;
    for (entity, rows) in tables {
        let table = state
            .table_mut(&entity)
            .ok_or_else(|| format!("Unknown entity type [{entity}]"))?;

        for row in rows {
            let id = table
                .row_id(&row)
                .ok_or_else(|| format!("Missing identifier in [{entity}]"))?;
            let position = table.position(&id);

            match (action, position) {
                ("add", Some(_)) => {
                    return Err(format!("Duplicate value [{id}] in entity type [{entity}]"))
                }
                ("update", None) => {
                    return Err(format!("Unknown entity [{id}] of type [{entity}]"))
                }
                ("add_ignore_existing", Some(_)) => continue,
                ("add" | "add_update_existing" | "add_ignore_existing", None) => {
                    table.rows.push(row)
                }
                ("update" | "add_update_existing", Some(p)) => table.rows[p] = row,
                (other, _) => return Err(format!("Invalid action [{other}]")),
            }
            written += 1;
        }
    }
    Ok(written)
}

/// POST /plugin/importwizard/importFile
///
/// Responds with the href of the new import run. Unless a status script was
/// set, the archive is applied immediately and the run reports RUNNING once,
/// then FINISHED or FAILED.
pub async fn import_file(
    State(state): State<Arc<RwLock<MockState>>>,
    Query(query): Query<ImportQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut body = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            body = field.bytes().await.ok().map(|b| b.to_vec());
        }
    }
    let Some(body) = body else {
        return error_response(StatusCode::BAD_REQUEST, "Missing file part");
    };

    let mut state = state.write().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    let run_id = state.issue_id("import");
    let action = query.action.clone().unwrap_or_else(|| "add".to_string());

    let (statuses, message) = match state.next_import.take() {
        Some(script) => script,
        None => {
            let outcome =
                read_archive(&state, &body).and_then(|tables| apply_import(&mut state, tables, &action));
            match outcome {
                Ok(written) => (
                    vec![ImportStatus::Running, ImportStatus::Finished],
                    Some(format!("Imported {written} rows")),
                ),
                Err(message) => (vec![ImportStatus::Running, ImportStatus::Failed], Some(message)),
            }
        }
    };
    tracing::debug!(%run_id, ?statuses, "import run created");

    state.import_runs.insert(
        run_id.clone(),
        MockImportRun {
            statuses: VecDeque::from(statuses),
            message,
            checks: 0,
        },
    );
    state.uploads.push(MockUpload {
        run_id: run_id.clone(),
        action: query.action,
        metadata_action: query.metadata_action,
        body,
    });

    (
        StatusCode::CREATED,
        [(header::CONTENT_TYPE, "text/plain")],
        format!("/api/v2/{IMPORT_RUN_ENTITY}/{run_id}"),
    )
        .into_response()
}
