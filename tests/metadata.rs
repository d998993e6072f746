//! Tests for metadata retrieval and conversion to upload format.
//!
//! Uses wiremock to serve metadata API responses.

use molgenis_client::{EntityMeta, FieldType, Get, MolgenisError, Row, Session};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

fn attribute(name: &str, field_type: &str, id: bool, target: Option<&str>) -> Value {
    let mut data = json!({"name": name, "type": field_type, "idAttribute": id});
    if let Some(target) = target {
        data["refEntityType"] = json!({"self": format!("/api/metadata/{target}")});
    }
    json!({"data": data})
}

async fn mount_entity_type(server: &MockServer, id: &str, attributes: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(format!("/api/metadata/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "href": format!("/api/metadata/{id}"),
            "data": {"id": id, "label": id, "attributes": {"items": attributes}}
        })))
        .mount(server)
        .await;
}

async fn mount_pet_schema(server: &MockServer) {
    mount_entity_type(
        server,
        "Pet",
        vec![
            attribute("name", "string", true, None),
            attribute("owner", "xref", false, Some("Person")),
            attribute("tags", "mref", false, Some("Tag")),
        ],
    )
    .await;
    mount_entity_type(
        server,
        "Person",
        vec![attribute("username", "string", true, None)],
    )
    .await;
    mount_entity_type(server, "Tag", vec![attribute("tag", "string", true, None)]).await;
}

#[tokio::test]
async fn test_get_meta_expands_reference_targets() {
    let mock_server = MockServer::start().await;
    mount_pet_schema(&mock_server).await;

    let session = Session::new(&mock_server.uri()).unwrap();
    let meta = session.get_meta("Pet", true, true).await.unwrap();

    assert_eq!(meta.attribute_names(), vec!["name", "owner", "tags"]);
    let owner = meta.attribute("owner").unwrap();
    let target = owner.ref_entity_type.as_ref().and_then(|r| r.expanded()).unwrap();
    assert_eq!(target.id, "Person");
    assert_eq!(target.id_attributes()[0].name, "username");
}

#[tokio::test]
async fn test_get_meta_passes_flatten_flag() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/metadata/Tag"))
        .and(query_param("flattenAttributes", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id": "Tag", "attributes": {"items": [attribute("tag", "string", true, None)]}}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = Session::new(&mock_server.uri()).unwrap();
    let meta = session.get_meta("Tag", false, false).await.unwrap();

    assert_eq!(meta.id, "Tag");
}

#[tokio::test]
async fn test_entity_meta_via_get_trait() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/Pet/meta"))
        .and(query_param("expand", "attributes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Pet",
            "idAttribute": "name",
            "attributes": {
                "name": {"name": "name", "fieldType": "STRING"},
                "owner": {"name": "owner", "fieldType": "XREF", "refEntity": {"href": "/api/v1/Person/meta"}}
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = Session::new(&mock_server.uri()).unwrap();
    let meta = EntityMeta::get(&session, "Pet".to_string()).await.unwrap();

    assert_eq!(meta.id_attribute.as_deref(), Some("name"));
    assert_eq!(meta.attribute("owner").unwrap().field_type, FieldType::Xref);
}

#[tokio::test]
async fn test_attribute_meta() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/Pet/meta/owner"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "owner", "fieldType": "XREF", "nillable": true
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = Session::new(&mock_server.uri()).unwrap();
    let attribute = session.get_attribute_meta_data("Pet", "owner").await.unwrap();

    assert_eq!(attribute.field_type, FieldType::Xref);
    assert!(attribute.nillable);
}

#[tokio::test]
async fn test_to_upload_format_reduces_references_to_ids() {
    let mock_server = MockServer::start().await;
    mount_pet_schema(&mock_server).await;

    let session = Session::new(&mock_server.uri()).unwrap();
    let rows = vec![row(json!({
        "_href": "/api/v2/Pet/rex",
        "_meta": {"name": "Pet"},
        "name": "rex",
        "owner": {"_href": "/api/v2/Person/ann", "username": "ann"},
        "tags": [
            {"_href": "/api/v2/Tag/dog", "tag": "dog"},
            {"_href": "/api/v2/Tag/brown", "tag": "brown"}
        ]
    }))];

    let uploadable = session.to_upload_format("Pet", &rows).await.unwrap();

    assert_eq!(
        Value::Object(uploadable[0].clone()),
        json!({"name": "rex", "owner": "ann", "tags": ["dog", "brown"]})
    );
    // The input is left untouched.
    assert!(rows[0].contains_key("_href"));
}

#[tokio::test]
async fn test_to_upload_format_missing_identifier() {
    let mock_server = MockServer::start().await;
    mount_pet_schema(&mock_server).await;

    let session = Session::new(&mock_server.uri()).unwrap();
    let rows = vec![row(json!({
        "name": "rex",
        "owner": {"_href": "/api/v2/Person/ann"}
    }))];

    let err = session.to_upload_format("Pet", &rows).await.unwrap_err();
    assert!(matches!(
        err,
        MolgenisError::MissingReferenceIdentifier { ref attribute, ref id_attribute }
            if attribute == "owner" && id_attribute == "username"
    ));
}
