//! Tests for row operations and upsert.
//!
//! Uses wiremock to mock the MOLGENIS API.

use molgenis_client::{FileAttachment, MolgenisError, Row, Session, UpsertSummary};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

async fn mount_person_meta(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/Person/meta"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Person",
            "idAttribute": "id",
            "attributes": {
                "id": {"name": "id", "fieldType": "STRING"},
                "name": {"name": "name", "fieldType": "STRING"},
                "children": {
                    "name": "children",
                    "fieldType": "ONE_TO_MANY",
                    "refEntity": {"href": "/api/v1/Person/meta"}
                }
            }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_upsert_partitions_adds_and_updates() {
    let mock_server = MockServer::start().await;
    mount_person_meta(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api/v2/Person"))
        .and(query_param("attrs", "id"))
        .and(query_param("num", "10000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "start": 0, "num": 10000, "total": 1,
            "items": [{"_href": "/api/v2/Person/a", "id": "a"}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v2/Person"))
        .and(body_json(json!({"entities": [{"id": "b", "name": "B"}]})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "location": "/api/v2/Person?q=id=in=(b)",
            "resources": [{"href": "/api/v2/Person/b"}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/api/v2/Person"))
        .and(body_json(json!({
            "entities": [{"id": "a", "name": "A2", "children": ["x"]}]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = Session::new(&mock_server.uri()).unwrap();
    let summary = session
        .upsert(
            "Person",
            &[
                row(json!({"id": "a", "name": "A2", "children": ["x"]})),
                row(json!({"id": "b", "name": "B", "children": ["y"]})),
            ],
        )
        .await
        .unwrap();

    assert_eq!(
        summary,
        UpsertSummary {
            added: vec!["b".to_string()],
            updated: 1
        }
    );
}

#[tokio::test]
async fn test_upsert_skips_empty_batches() {
    let mock_server = MockServer::start().await;
    mount_person_meta(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/api/v2/Person"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "start": 0, "num": 10000, "total": 0, "items": []
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/api/v2/Person"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v2/Person"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "resources": [{"href": "/api/v2/Person/n1"}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = Session::new(&mock_server.uri()).unwrap();
    let summary = session
        .upsert("Person", &[row(json!({"name": "no id yet"}))])
        .await
        .unwrap();

    assert_eq!(summary.added, vec!["n1"]);
    assert_eq!(summary.updated, 0);
}

#[tokio::test]
async fn test_add_returns_id_from_location() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/Person"))
        .and(body_json(json!({"id": "c", "name": "C"})))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Location", "/api/v1/Person/c"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = Session::new(&mock_server.uri()).unwrap();
    let id = session
        .add("Person", &row(json!({"id": "c", "name": "C"})))
        .await
        .unwrap();

    assert_eq!(id, "c");
}

#[tokio::test]
async fn test_add_without_location_is_invalid_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/Person"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&mock_server)
        .await;

    let session = Session::new(&mock_server.uri()).unwrap();
    let err = session
        .add("Person", &row(json!({"id": "c"})))
        .await
        .unwrap_err();

    assert!(matches!(err, MolgenisError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_add_with_files_sends_multipart() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/Report"))
        .and(header_exists("content-type"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Location", "http://example.org/api/v1/Report/r1"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = Session::new(&mock_server.uri()).unwrap();
    let id = session
        .add_with_files(
            "Report",
            &row(json!({"title": "Q1", "tags": ["a", "b"]})),
            vec![FileAttachment::new("pdf", "q1.pdf", b"%PDF".to_vec())],
        )
        .await
        .unwrap();

    assert_eq!(id, "r1");
    let requests = mock_server.received_requests().await.unwrap();
    let content_type = requests[0].headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"tags\""));
    assert!(body.contains("a,b"));
    assert!(body.contains("filename=\"q1.pdf\""));
}

#[tokio::test]
async fn test_add_all_returns_ids_in_order() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/Tag"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "location": "/api/v2/Tag?q=id=in=(x,y)",
            "resources": [{"href": "/api/v2/Tag/x"}, {"href": "/api/v2/Tag/y"}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = Session::new(&mock_server.uri()).unwrap();
    let ids = session
        .add_all("Tag", &[row(json!({"id": "x"})), row(json!({"id": "y"}))])
        .await
        .unwrap();

    assert_eq!(ids, vec!["x", "y"]);
}

#[tokio::test]
async fn test_update_one_puts_attribute_value() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/Person/a/name"))
        .and(body_json(json!("Anne")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = Session::new(&mock_server.uri()).unwrap();
    session
        .update_one("Person", "a", "name", &json!("Anne"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_by_id_and_all() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/Person/a"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/Person"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = Session::new(&mock_server.uri()).unwrap();
    session.delete("Person", Some("a")).await.unwrap();
    session.delete("Person", None).await.unwrap();
}

#[tokio::test]
async fn test_delete_list_sends_entity_ids() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/v2/Person"))
        .and(body_json(json!({"entityIds": ["a", "b"]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = Session::new(&mock_server.uri()).unwrap();
    session
        .delete_list("Person", &["a".to_string(), "b".to_string()])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_get_by_id_with_attributes_and_expand() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/Pet/rex"))
        .and(query_param("attrs", "name,owner(*)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_href": "/api/v2/Pet/rex",
            "name": "rex",
            "owner": {"_href": "/api/v2/Person/ann", "username": "ann", "age": 29}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let session = Session::new(&mock_server.uri()).unwrap();
    let pet = session
        .get_by_id("Pet", "rex", Some("name"), Some("owner"))
        .await
        .unwrap();

    assert_eq!(pet["owner"]["age"], 29);
}
