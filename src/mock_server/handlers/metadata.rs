//! Metadata endpoint handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;

use super::{authorize, error_response, unknown_entity};
use crate::mock_server::state::MockState;
use crate::{Attribute, EntityType, RefEntityType};

/// Render an attribute in the v1 metadata shape.
fn v1_attribute(entity: &str, attribute: &Attribute) -> Value {
    let mut meta = json!({
        "href": format!("/api/v1/{entity}/meta/{}", attribute.name),
        "name": attribute.name,
        "fieldType": attribute.field_type.as_str(),
        "nillable": attribute.nullable,
        "labelAttribute": attribute.label_attribute,
        "unique": attribute.id_attribute,
    });
    if let Some(target) = attribute
        .ref_entity_type
        .as_ref()
        .and_then(RefEntityType::entity_type_id)
    {
        meta["refEntity"] = json!({
            "href": format!("/api/v1/{target}/meta"),
            "hrefCollection": format!("/api/v1/{target}"),
        });
    }
    meta
}

/// Render an entity type in the v1 metadata shape.
fn v1_entity(meta: &EntityType) -> Value {
    let id_attribute = meta.id_attributes().first().map(|a| a.name.clone());
    let attributes: Map<String, Value> = meta
        .attributes
        .iter()
        .map(|a| (a.name.clone(), v1_attribute(&meta.id, a)))
        .collect();

    json!({
        "href": format!("/api/v1/{}/meta", meta.id),
        "name": meta.id,
        "label": meta.label,
        "description": meta.description,
        "idAttribute": id_attribute,
        "labelAttribute": id_attribute,
        "isAbstract": meta.is_abstract,
        "writable": true,
        "attributes": attributes,
    })
}

/// GET /api/v1/{entity}/meta
pub async fn get_entity_meta(
    State(state): State<Arc<RwLock<MockState>>>,
    Path(entity): Path<String>,
    headers: HeaderMap,
) -> Response {
    let state = state.read().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    match state.table(&entity) {
        Some(table) => (StatusCode::OK, Json(v1_entity(&table.meta))).into_response(),
        None => unknown_entity(&entity),
    }
}

/// GET /api/v1/{entity}/meta/{attribute}
pub async fn get_attribute_meta(
    State(state): State<Arc<RwLock<MockState>>>,
    Path((entity, attribute)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let state = state.read().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    let Some(table) = state.table(&entity) else {
        return unknown_entity(&entity);
    };
    match table.meta.attribute(&attribute) {
        Some(a) => (StatusCode::OK, Json(v1_attribute(&entity, a))).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("Unknown attribute [{attribute}] of entity type [{entity}]"),
        ),
    }
}

/// GET /api/metadata/{entity}
pub async fn get_entity_type(
    State(state): State<Arc<RwLock<MockState>>>,
    Path(entity): Path<String>,
    headers: HeaderMap,
) -> Response {
    let state = state.read().await;
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    match state.table(&entity) {
        Some(table) => (
            StatusCode::OK,
            Json(json!({
                "href": format!("/api/metadata/{entity}"),
                "data": table.meta,
            })),
        )
            .into_response(),
        None => unknown_entity(&entity),
    }
}
