use kafka_types::SchemaId;
use mockito::Matcher;
use schema_registry::{
    CachedSchemaRegistry, HttpSchemaRegistry, RegistryError, SchemaRegistry,
    DEFAULT_REQUEST_TIMEOUT,
};

const USERS: &str = r#"{"type":"record","name":"Users","fields":[{"name":"id","type":"int"}]}"#;
const CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

fn client(server: &mockito::ServerGuard) -> HttpSchemaRegistry {
    HttpSchemaRegistry::new(&server.url(), DEFAULT_REQUEST_TIMEOUT).unwrap()
}

#[tokio::test]
async fn test_register_posts_schema() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/subjects/users-value/versions")
        .match_header("content-type", CONTENT_TYPE)
        .match_body(Matcher::Json(serde_json::json!({ "schema": USERS })))
        .with_status(200)
        .with_header("content-type", CONTENT_TYPE)
        .with_body(r#"{"id":21}"#)
        .create_async()
        .await;

    let id = client(&server).register("users-value", USERS).await.unwrap();
    assert_eq!(id, SchemaId(21));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_lookup_returns_schema() {
    let mut server = mockito::Server::new_async().await;
    let body = serde_json::json!({ "schema": USERS }).to_string();
    server
        .mock("GET", "/schemas/ids/21")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let schema = client(&server).lookup(SchemaId(21)).await.unwrap();
    assert_eq!(schema, USERS);
}

#[tokio::test]
async fn test_lookup_unknown_id() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/schemas/ids/404")
        .with_status(404)
        .with_body(r#"{"error_code":40403,"message":"Schema not found"}"#)
        .create_async()
        .await;

    let err = client(&server).lookup(SchemaId(404)).await.unwrap_err();
    assert_eq!(err, RegistryError::NotFound(SchemaId(404)));
}

#[tokio::test]
async fn test_incompatible_schema() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/subjects/users-value/versions")
        .with_status(409)
        .with_body(r#"{"error_code":409,"message":"Schema being registered is incompatible"}"#)
        .create_async()
        .await;

    let err = client(&server)
        .register("users-value", USERS)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RegistryError::Incompatible {
            subject: "users-value".into(),
            message: "Schema being registered is incompatible".into(),
        }
    );
}

#[tokio::test]
async fn test_invalid_schema() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/subjects/users-value/versions")
        .with_status(422)
        .with_body(r#"{"error_code":42201,"message":"Invalid schema"}"#)
        .create_async()
        .await;

    let err = client(&server)
        .register("users-value", "{}")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RegistryError::InvalidSchema("Invalid schema (error code 42201)".into())
    );
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/schemas/ids/1")
        .with_status(503)
        .create_async()
        .await;

    let err = client(&server).lookup(SchemaId(1)).await.unwrap_err();
    assert!(matches!(err, RegistryError::Unavailable(_)), "{err:?}");
}

#[tokio::test]
async fn test_unreachable_is_unavailable() {
    // Nothing listens on port 9 (discard) in the test environment.
    let registry = HttpSchemaRegistry::new(
        "http://127.0.0.1:9",
        std::time::Duration::from_millis(500),
    )
    .unwrap();
    let err = registry.lookup(SchemaId(1)).await.unwrap_err();
    assert!(matches!(err, RegistryError::Unavailable(_)), "{err:?}");
}

#[tokio::test]
async fn test_basic_auth_header() {
    let mut server = mockito::Server::new_async().await;
    // "user:secret" base64-encoded
    let mock = server
        .mock("GET", "/schemas/ids/3")
        .match_header("authorization", "Basic dXNlcjpzZWNyZXQ=")
        .with_status(200)
        .with_body(serde_json::json!({ "schema": USERS }).to_string())
        .create_async()
        .await;

    let registry = client(&server).with_basic_auth("user:secret");
    registry.lookup(SchemaId(3)).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_cache_avoids_second_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/schemas/ids/5")
        .with_status(200)
        .with_body(serde_json::json!({ "schema": USERS }).to_string())
        .expect(1)
        .create_async()
        .await;

    let registry = CachedSchemaRegistry::new(client(&server));
    for _ in 0..3 {
        assert_eq!(registry.lookup(SchemaId(5)).await.unwrap(), USERS);
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_subject_is_percent_encoded() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/subjects/tenant%251%2FUsers%3F%23/versions")
        .with_status(200)
        .with_body(r#"{"id":5}"#)
        .create_async()
        .await;

    let id = client(&server)
        .register("tenant%1/Users?#", USERS)
        .await
        .unwrap();
    assert_eq!(id, SchemaId(5));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_base_url_path_kept() {
    let mut server = mockito::Server::new_async().await;
    let body = serde_json::json!({ "schema": USERS }).to_string();
    let mock = server
        .mock("GET", "/registry/schemas/ids/3")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let registry = HttpSchemaRegistry::new(
        &format!("{}/registry/", server.url()),
        DEFAULT_REQUEST_TIMEOUT,
    )
    .unwrap();
    assert_eq!(registry.lookup(SchemaId(3)).await.unwrap(), USERS);
    mock.assert_async().await;
}

#[test]
fn test_invalid_url_rejected() {
    // Without a scheme, "localhost" parses as one.
    let err = HttpSchemaRegistry::new("localhost:8081", DEFAULT_REQUEST_TIMEOUT).unwrap_err();
    assert!(matches!(err, RegistryError::InvalidUrl { .. }), "{err:?}");

    let err = HttpSchemaRegistry::new("http://", DEFAULT_REQUEST_TIMEOUT).unwrap_err();
    assert!(matches!(err, RegistryError::InvalidUrl { .. }), "{err:?}");
}
