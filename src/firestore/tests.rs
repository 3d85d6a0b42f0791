use super::*;
use crate::config::{Backend, ClientConfig};
use crate::core::middleware::Credential;
use httpmock::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

const DOCUMENTS_PATH: &str = "/v1/projects/p/databases/(default)/documents";

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Repro {
    foo: String,
    count: i64,
}

fn plain_client(server: &MockServer) -> Firestore {
    let client = ClientBuilder::new(Client::new()).build();
    Firestore::new_with_client(client, server.url(DOCUMENTS_PATH))
}

fn data(value: SerdeValue) -> DocumentData {
    match value {
        SerdeValue::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[test]
fn test_base_url_for_emulator_and_prod() {
    let emulator = FirebaseApp::new(
        "a",
        ClientConfig::new(Backend::Emulator, "demo", "unused").unwrap(),
    );
    assert_eq!(
        emulator.firestore().base_url(),
        "http://127.0.0.1:8080/v1/projects/demo/databases/(default)/documents"
    );

    let prod = FirebaseApp::new("b", ClientConfig::new(Backend::Prod, "real", "key").unwrap());
    assert_eq!(
        prod.firestore().base_url(),
        "https://firestore.googleapis.com/v1/projects/real/databases/(default)/documents"
    );
}

#[tokio::test]
async fn test_get_document_converts_typed_fields() {
    let server = MockServer::start();
    let db = plain_client(&server);

    let mock = server.mock(|when, then| {
        when.method(GET).path(format!("{DOCUMENTS_PATH}/repro/doc1"));
        then.status(200).json_body(json!({
            "name": "projects/p/databases/(default)/documents/repro/doc1",
            "fields": {
                "foo": { "stringValue": "123" },
                "count": { "integerValue": "7" }
            },
            "createTime": "2024-01-01T00:00:00Z",
            "updateTime": "2024-01-01T00:00:00Z"
        }));
    });

    let doc: Option<Repro> = db.doc("repro/doc1").get().await.unwrap();
    assert_eq!(
        doc,
        Some(Repro {
            foo: "123".to_string(),
            count: 7
        })
    );
    mock.assert();
}

#[tokio::test]
async fn test_get_missing_document_is_none() {
    let server = MockServer::start();
    let db = plain_client(&server);

    server.mock(|when, then| {
        when.method(GET).path(format!("{DOCUMENTS_PATH}/repro/missing"));
        then.status(404).json_body(json!({
            "error": { "code": 404, "message": "not found", "status": "NOT_FOUND" }
        }));
    });

    assert!(db.get_document("repro/missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_get_404_without_not_found_status_is_an_error() {
    let server = MockServer::start();
    let db = plain_client(&server);

    server.mock(|when, then| {
        when.method(GET).path(format!("{DOCUMENTS_PATH}/repro/doc1"));
        then.status(404)
            .header("content-type", "text/html")
            .body("<html><body>Not Found</body></html>");
    });

    let err = db.get_document("repro/doc1").await.unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, FirestoreError::ApiError(_)));
    assert!(message.contains("Get document failed"), "{message}");
    assert!(message.contains("404"), "{message}");
}

#[tokio::test]
async fn test_set_document_sends_typed_fields() {
    let server = MockServer::start();
    let db = plain_client(&server);

    let mock = server.mock(|when, then| {
        when.method(PATCH)
            .path(format!("{DOCUMENTS_PATH}/repro/doc1"))
            .json_body(json!({ "fields": { "foo": { "stringValue": "123-NEW" } } }));
        then.status(200).json_body(json!({
            "name": "projects/p/databases/(default)/documents/repro/doc1",
            "fields": { "foo": { "stringValue": "123-NEW" } }
        }));
    });

    db.set_document("repro/doc1", &data(json!({ "foo": "123-NEW" })))
        .await
        .unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_add_posts_typed_fields_and_returns_document() {
    let server = MockServer::start();
    let db = plain_client(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{DOCUMENTS_PATH}/repro"))
            .json_body(json!({
                "fields": {
                    "foo": { "stringValue": "123" },
                    "count": { "integerValue": "1" }
                }
            }));
        then.status(200).json_body(json!({
            "name": "projects/p/databases/(default)/documents/repro/AbC123",
            "fields": {
                "foo": { "stringValue": "123" },
                "count": { "integerValue": "1" }
            },
            "createTime": "2024-01-01T00:00:00Z",
            "updateTime": "2024-01-01T00:00:00Z"
        }));
    });

    let doc = db
        .collection("repro")
        .add(&Repro {
            foo: "123".to_string(),
            count: 1,
        })
        .await
        .unwrap();
    assert_eq!(doc.id(), "AbC123");
    assert_eq!(
        doc.fields.get("foo").map(|v| &v.value_type),
        Some(&models::ValueType::StringValue("123".to_string()))
    );
    mock.assert();
}

#[tokio::test]
async fn test_add_rejects_non_object_before_sending() {
    let server = MockServer::start();
    let db = plain_client(&server);

    let err = db.collection("repro").add(&"just a string").await.unwrap_err();
    assert!(matches!(err, FirestoreError::SerializationError(_)));
}

#[tokio::test]
async fn test_update_sends_field_mask() {
    let server = MockServer::start();
    let db = plain_client(&server);

    let mock = server.mock(|when, then| {
        when.method(PATCH)
            .path(format!("{DOCUMENTS_PATH}/repro/doc1"))
            .query_param("updateMask.fieldPaths", "foo");
        then.status(200).json_body(json!({
            "name": "projects/p/databases/(default)/documents/repro/doc1"
        }));
    });

    db.doc("repro/doc1")
        .update(&json!({ "foo": "x" }), Some(vec!["foo".to_string()]))
        .await
        .unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_api_error_carries_status_and_message() {
    let server = MockServer::start();
    let db = plain_client(&server);

    server.mock(|when, then| {
        when.method(PATCH).path(format!("{DOCUMENTS_PATH}/repro/doc1"));
        then.status(403).json_body(json!({
            "error": {
                "code": 403,
                "message": "Missing or insufficient permissions.",
                "status": "PERMISSION_DENIED"
            }
        }));
    });

    let err = db
        .set_document("repro/doc1", &data(json!({ "foo": "1" })))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("PERMISSION_DENIED"), "{message}");
    assert!(message.contains("Set document failed"), "{message}");
}

#[tokio::test]
async fn test_list_document_ids_of_empty_collection() {
    let server = MockServer::start();
    let db = plain_client(&server);

    server.mock(|when, then| {
        when.method(GET).path(format!("{DOCUMENTS_PATH}/repro"));
        then.status(200).json_body(json!({}));
    });

    assert!(db.list_document_ids("repro").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_document_ids_follows_page_tokens() {
    let server = MockServer::start();
    let db = plain_client(&server);

    let second = server.mock(|when, then| {
        when.method(GET)
            .path(format!("{DOCUMENTS_PATH}/repro"))
            .query_param("pageToken", "next");
        then.status(200).json_body(json!({
            "documents": [
                { "name": "projects/p/databases/(default)/documents/repro/b" }
            ]
        }));
    });
    let first = server.mock(|when, then| {
        when.method(GET).path(format!("{DOCUMENTS_PATH}/repro"));
        then.status(200).json_body(json!({
            "documents": [
                { "name": "projects/p/databases/(default)/documents/repro/a" }
            ],
            "nextPageToken": "next"
        }));
    });

    let ids = db.list_document_ids("repro").await.unwrap();
    assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    first.assert();
    second.assert();
}

#[tokio::test]
async fn test_api_key_is_sent_as_query_parameter() {
    let server = MockServer::start();
    let db = Firestore::new_with_url(
        CredentialMiddleware::new(Credential::ApiKey("secret".to_string())),
        server.url(DOCUMENTS_PATH),
    );

    let mock = server.mock(|when, then| {
        when.method(DELETE)
            .path(format!("{DOCUMENTS_PATH}/repro/doc1"))
            .query_param("key", "secret");
        then.status(200).json_body(json!({}));
    });

    db.delete_document("repro/doc1").await.unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_emulator_uses_owner_token() {
    let server = MockServer::start();
    let db = Firestore::new_with_url(
        CredentialMiddleware::new(Credential::EmulatorOwner),
        server.url(DOCUMENTS_PATH),
    );

    let mock = server.mock(|when, then| {
        when.method(GET)
            .path(format!("{DOCUMENTS_PATH}/repro/doc1"))
            .header("authorization", "Bearer owner");
        then.status(404).json_body(json!({
            "error": { "code": 404, "message": "no entity", "status": "NOT_FOUND" }
        }));
    });

    assert!(db.get_document("repro/doc1").await.unwrap().is_none());
    mock.assert();
}

#[tokio::test]
async fn test_invalid_paths_are_rejected_before_any_request() {
    let db = MemoryFirestore::new();
    assert!(matches!(
        db.get_document("repro").await,
        Err(FirestoreError::InvalidPath(_))
    ));
    assert!(matches!(
        db.list_document_ids("repro/doc1").await,
        Err(FirestoreError::InvalidPath(_))
    ));
    assert!(matches!(
        db.set_document("repro//doc1", &DocumentData::new()).await,
        Err(FirestoreError::InvalidPath(_))
    ));
}

#[tokio::test]
async fn test_memory_store_lists_direct_children_only() {
    let db = MemoryFirestore::new();
    let payload = data(json!({ "foo": "123" }));
    db.set_document("repro/a", &payload).await.unwrap();
    db.set_document("repro/b", &payload).await.unwrap();
    db.set_document("repro/a/nested/c", &payload).await.unwrap();
    db.set_document("repro-other/d", &payload).await.unwrap();

    assert_eq!(
        db.list_document_ids("repro").await.unwrap(),
        vec!["a".to_string(), "b".to_string()]
    );
    assert_eq!(
        db.list_document_ids("repro/a/nested").await.unwrap(),
        vec!["c".to_string()]
    );
}

#[tokio::test]
async fn test_memory_store_overwrite_keeps_create_time() {
    let db = MemoryFirestore::new();
    db.set_document("repro/doc1", &data(json!({ "foo": "123" })))
        .await
        .unwrap();
    let (created, _) = db.timestamps("repro/doc1").await.unwrap();

    db.set_document("repro/doc1", &data(json!({ "foo": "123-NEW" })))
        .await
        .unwrap();
    let (created_again, updated) = db.timestamps("repro/doc1").await.unwrap();

    assert_eq!(created, created_again);
    assert!(updated >= created);
    assert_eq!(
        db.get_document("repro/doc1").await.unwrap(),
        Some(data(json!({ "foo": "123-NEW" })))
    );

    db.delete_document("repro/doc1").await.unwrap();
    assert!(db.is_empty().await);
}
