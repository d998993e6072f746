//! Row endpoint handlers for the v1 and v2 APIs.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use super::{authorize, error_response, unknown_entity};
use crate::mock_server::state::{value_text, BulkRequest, MockState, MockTable};
use crate::{RefEntityType, Row, IMPORT_RUN_ENTITY};

/// Largest page the v2 API serves.
const MAX_PAGE_SIZE: usize = 10_000;

/// Query parameters for v2 reads.
#[derive(Debug, Default, Deserialize)]
pub struct RowsQuery {
    pub q: Option<String>,
    pub attrs: Option<String>,
    pub num: Option<usize>,
    pub start: Option<usize>,
    pub sort: Option<String>,
}

/// Body of v2 bulk adds and updates.
#[derive(Debug, Deserialize)]
pub struct EntitiesBody {
    pub entities: Vec<Row>,
}

/// Body of v2 bulk deletes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityIdsBody {
    pub entity_ids: Vec<String>,
}

/// Attribute selection parsed from an `attrs` operator.
#[derive(Debug, Default)]
struct Selection {
    /// Selected names; `None` selects every attribute.
    names: Option<HashSet<String>>,
    expanded: HashSet<String>,
}

impl Selection {
    /// Parse `a,b(*),c(x,y)`. Only top-level names are considered.
    fn parse(attrs: Option<&str>) -> Self {
        let Some(attrs) = attrs else {
            return Self::default();
        };

        let mut items = Vec::new();
        let mut depth = 0usize;
        let mut current = String::new();
        for c in attrs.chars() {
            match c {
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                ',' if depth == 0 => items.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
        items.push(current);

        let mut names = HashSet::new();
        let mut expanded = HashSet::new();
        let mut all = false;
        for item in items {
            let (name, sub) = match item.split_once('(') {
                Some((name, rest)) => (name.to_string(), Some(rest)),
                None => (item, None),
            };
            if name == "*" {
                all = true;
            } else if !name.is_empty() {
                if sub.is_some() {
                    expanded.insert(name.clone());
                }
                names.insert(name);
            }
        }

        Self {
            names: if all { None } else { Some(names) },
            expanded,
        }
    }

    fn includes(&self, name: &str) -> bool {
        self.names.as_ref().map_or(true, |n| n.contains(name))
    }
}

fn row_href(entity: &str, id: &str) -> String {
    format!("/api/v2/{entity}/{id}")
}

/// Render a stored reference id as the server does: an object with `_href`
/// and the identifier, or the full row when expanded.
fn render_reference(state: &MockState, target: &str, id: &Value, expand: bool) -> Value {
    let id_text = value_text(id);
    let Some(table) = state.table(target) else {
        return id.clone();
    };

    let mut object = Row::new();
    object.insert("_href".to_string(), json!(row_href(target, &id_text)));
    match table.find(&id_text) {
        Some(row) if expand => {
            for (key, value) in row {
                object.insert(key.clone(), value.clone());
            }
        }
        _ => {
            if let Some(id_attribute) = table.id_attribute() {
                object.insert(id_attribute.to_string(), id.clone());
            }
        }
    }
    Value::Object(object)
}

/// Render a stored row in the v2 shape.
fn render_row(state: &MockState, table: &MockTable, row: &Row, selection: &Selection) -> Row {
    let mut rendered = Row::new();
    if let Some(id) = table.row_id(row) {
        rendered.insert("_href".to_string(), json!(row_href(&table.meta.id, &id)));
    }

    for attribute in &table.meta.attributes {
        if !selection.includes(&attribute.name) {
            continue;
        }
        let Some(value) = row.get(&attribute.name) else {
            continue;
        };

        let target = attribute
            .ref_entity_type
            .as_ref()
            .and_then(RefEntityType::entity_type_id);
        let expand = selection.expanded.contains(&attribute.name);

        let value = match (target, value) {
            (Some(target), Value::Array(ids)) => Value::Array(
                ids.iter()
                    .map(|id| render_reference(state, target, id, expand))
                    .collect(),
            ),
            (Some(_), Value::Null | Value::Object(_)) => value.clone(),
            (Some(target), id) => render_reference(state, target, id, expand),
            (None, value) => value.clone(),
        };
        rendered.insert(attribute.name.clone(), value);
    }

    rendered
}

fn parse_sort(sort: Option<&str>) -> Option<(&str, bool)> {
    let sort = sort.filter(|s| !s.is_empty())?;
    Some(match sort.split_once(':') {
        Some((column, order)) => (column, order.eq_ignore_ascii_case("desc")),
        None => (sort, false),
    })
}

/// GET /api/v2/{entity}
pub async fn list_rows(
    State(state): State<Arc<RwLock<MockState>>>,
    Path(entity): Path<String>,
    Query(query): Query<RowsQuery>,
    headers: HeaderMap,
) -> Response {
    let state = state.read().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    let Some(table) = state.table(&entity) else {
        return unknown_entity(&entity);
    };
    let Some(rows) = state.query_rows(&entity, query.q.as_deref(), parse_sort(query.sort.as_deref()))
    else {
        return unknown_entity(&entity);
    };

    let num = query.num.unwrap_or(100).min(MAX_PAGE_SIZE);
    let start = query.start.unwrap_or(0);
    let total = rows.len();
    let selection = Selection::parse(query.attrs.as_deref());

    let items: Vec<Row> = rows
        .into_iter()
        .skip(start)
        .take(num)
        .map(|row| render_row(&state, table, row, &selection))
        .collect();

    let mut page = json!({
        "href": format!("/api/v2/{entity}"),
        "start": start,
        "num": num,
        "total": total,
        "items": items,
    });
    if num > 0 && start + num < total {
        page["nextHref"] = json!(format!("/api/v2/{entity}?start={}&num={num}", start + num));
    }
    if start > 0 {
        page["prevHref"] = json!(format!(
            "/api/v2/{entity}?start={}&num={num}",
            start.saturating_sub(num)
        ));
    }

    (StatusCode::OK, Json(page)).into_response()
}

/// GET /api/v2/{entity}/{id}
///
/// Import runs are served from the scripted runs, advancing their status.
pub async fn get_row(
    State(state): State<Arc<RwLock<MockState>>>,
    Path((entity, id)): Path<(String, String)>,
    Query(query): Query<RowsQuery>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.write().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    if entity == IMPORT_RUN_ENTITY {
        return match state.import_runs.get_mut(&id) {
            Some(run) => {
                let status = run.next_status();
                (
                    StatusCode::OK,
                    Json(json!({
                        "_href": row_href(&entity, &id),
                        "id": id,
                        "status": status,
                        "message": run.message,
                        "username": "admin",
                    })),
                )
                    .into_response()
            }
            None => error_response(
                StatusCode::NOT_FOUND,
                format!("Unknown entity with 'id' [{id}] of type [{entity}]"),
            ),
        };
    }

    let Some(table) = state.table(&entity) else {
        return unknown_entity(&entity);
    };
    match table.find(&id) {
        Some(row) => {
            let selection = Selection::parse(query.attrs.as_deref());
            (StatusCode::OK, Json(render_row(&state, table, row, &selection))).into_response()
        }
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("Unknown entity with id [{id}] of type [{entity}]"),
        ),
    }
}

/// Check rows for a create: identifiers present and new, no one-to-many values.
fn validate_new_rows(table: &MockTable, rows: &[Row]) -> Result<Vec<String>, String> {
    let one_to_manys = table.one_to_many_attributes();
    let mut ids = Vec::with_capacity(rows.len());

    for row in rows {
        if let Some(attribute) = one_to_manys.iter().find(|a| row.contains_key(**a)) {
            return Err(format!(
                "Attribute [{attribute}] of type ONE_TO_MANY cannot be set on create"
            ));
        }
        let id = table
            .row_id(row)
            .ok_or_else(|| "The attribute [id] may not be null".to_string())?;
        if table.find(&id).is_some() || ids.contains(&id) {
            return Err(format!("Duplicate value [{id}] for unique attribute"));
        }
        ids.push(id);
    }
    Ok(ids)
}

/// POST /api/v2/{entity}
pub async fn add_rows(
    State(state): State<Arc<RwLock<MockState>>>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Json(body): Json<EntitiesBody>,
) -> Response {
    let mut state = state.write().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    state.bulk_requests.push(BulkRequest {
        method: "POST",
        entity: entity.clone(),
        entities: body.entities.clone(),
    });

    let Some(table) = state.table_mut(&entity) else {
        return unknown_entity(&entity);
    };
    let ids = match validate_new_rows(table, &body.entities) {
        Ok(ids) => ids,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };
    table.rows.extend(body.entities);

    let resources: Vec<Value> = ids
        .iter()
        .map(|id| json!({"href": row_href(&entity, id)}))
        .collect();
    (
        StatusCode::CREATED,
        Json(json!({
            "location": format!("/api/v2/{entity}?q=id=in=({})", ids.join(",")),
            "resources": resources,
        })),
    )
        .into_response()
}

/// PUT /api/v2/{entity}
pub async fn update_rows(
    State(state): State<Arc<RwLock<MockState>>>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Json(body): Json<EntitiesBody>,
) -> Response {
    let mut state = state.write().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    state.bulk_requests.push(BulkRequest {
        method: "PUT",
        entity: entity.clone(),
        entities: body.entities.clone(),
    });

    let Some(table) = state.table_mut(&entity) else {
        return unknown_entity(&entity);
    };

    let mut positions = Vec::with_capacity(body.entities.len());
    for row in &body.entities {
        match table.row_id(row).and_then(|id| table.position(&id)) {
            Some(position) => positions.push(position),
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Cannot update unknown entity of type [{entity}]"),
                )
            }
        }
    }
    for (position, row) in positions.into_iter().zip(body.entities) {
        table.rows[position] = row;
    }

    StatusCode::OK.into_response()
}

/// DELETE /api/v2/{entity}
pub async fn delete_rows(
    State(state): State<Arc<RwLock<MockState>>>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Json(body): Json<EntityIdsBody>,
) -> Response {
    let mut state = state.write().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    let Some(table) = state.table_mut(&entity) else {
        return unknown_entity(&entity);
    };
    let ids: HashSet<&String> = body.entity_ids.iter().collect();
    let id_attribute = table.id_attribute().map(str::to_string);
    table.rows.retain(|row| {
        id_attribute
            .as_ref()
            .and_then(|a| row.get(a))
            .map_or(true, |id| !ids.contains(&value_text(id)))
    });

    StatusCode::NO_CONTENT.into_response()
}

/// Read a v1 create body, either JSON or a multipart form with file parts.
async fn read_v1_row(request: Request) -> Result<Row, Response> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if !is_multipart {
        let Json(row) = Json::<Row>::from_request(request, &())
            .await
            .map_err(IntoResponse::into_response)?;
        return Ok(row);
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(IntoResponse::into_response)?;
    let mut row = Row::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let _ = field.bytes().await;
                json!(file_name)
            }
            None => json!(field.text().await.unwrap_or_default()),
        };
        row.insert(name, value);
    }
    Ok(row)
}

/// POST /api/v1/{entity}
///
/// Responds with the new row's location; missing identifiers are generated.
pub async fn add_row(
    State(state): State<Arc<RwLock<MockState>>>,
    Path(entity): Path<String>,
    request: Request,
) -> Response {
    let headers = request.headers().clone();
    let mut row = match read_v1_row(request).await {
        Ok(row) => row,
        Err(response) => return response,
    };

    let mut state = state.write().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    let generated = state.issue_id("auto");
    let Some(table) = state.table_mut(&entity) else {
        return unknown_entity(&entity);
    };
    if let Some(id_attribute) = table.id_attribute().map(str::to_string) {
        row.entry(id_attribute).or_insert_with(|| json!(generated));
    }
    let ids = match validate_new_rows(table, std::slice::from_ref(&row)) {
        Ok(ids) => ids,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };
    table.rows.push(row);

    let location = ids
        .first()
        .map(|id| format!("/api/v1/{entity}/{id}"))
        .unwrap_or_default();
    (StatusCode::CREATED, [(header::LOCATION, location)]).into_response()
}

/// PUT /api/v1/{entity}/{id}/{attribute}
pub async fn update_attribute(
    State(state): State<Arc<RwLock<MockState>>>,
    Path((entity, id, attribute)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(value): Json<Value>,
) -> Response {
    let mut state = state.write().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    let Some(table) = state.table_mut(&entity) else {
        return unknown_entity(&entity);
    };
    if table.meta.attribute(&attribute).is_none() {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Unknown attribute [{attribute}] of entity type [{entity}]"),
        );
    }
    match table.position(&id) {
        Some(position) => {
            table.rows[position].insert(attribute, value);
            StatusCode::OK.into_response()
        }
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("Unknown entity with id [{id}] of type [{entity}]"),
        ),
    }
}

/// DELETE /api/v1/{entity}/{id}
pub async fn delete_row(
    State(state): State<Arc<RwLock<MockState>>>,
    Path((entity, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.write().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    let Some(table) = state.table_mut(&entity) else {
        return unknown_entity(&entity);
    };
    match table.position(&id) {
        Some(position) => {
            table.rows.remove(position);
            StatusCode::NO_CONTENT.into_response()
        }
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("Unknown entity with id [{id}] of type [{entity}]"),
        ),
    }
}

/// DELETE /api/v1/{entity}
pub async fn delete_all_rows(
    State(state): State<Arc<RwLock<MockState>>>,
    Path(entity): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.write().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    match state.table_mut(&entity) {
        Some(table) => {
            table.rows.clear();
            StatusCode::NO_CONTENT.into_response()
        }
        None => unknown_entity(&entity),
    }
}
