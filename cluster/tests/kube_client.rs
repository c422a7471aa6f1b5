use axum::{
    Json, Router,
    extract::Path,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use ephemera_cluster::{
    ClusterApi, ClusterError, KubeClient, Kubeconfig, ResourceKey, ResourceKind,
};
use serde_json::{Value, json};

const TOKEN: &str = "secret-token";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

fn status(code: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (
        code,
        Json(json!({ "kind": "Status", "status": "Failure", "message": message })),
    )
}

async fn create_namespace(headers: HeaderMap, Json(mut body): Json<Value>) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return status(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    if body["metadata"]["name"] == "taken" {
        return status(StatusCode::CONFLICT, "namespaces \"taken\" already exists");
    }
    body["metadata"]["uid"] = json!("0000-1111");
    (StatusCode::CREATED, Json(body))
}

async fn get_namespace(Path(name): Path<String>) -> (StatusCode, Json<Value>) {
    if name == "present" {
        (StatusCode::OK, Json(json!({ "metadata": { "name": name } })))
    } else {
        status(StatusCode::NOT_FOUND, "not found")
    }
}

async fn delete_namespace(Path(name): Path<String>) -> (StatusCode, Json<Value>) {
    if name == "present" {
        (StatusCode::OK, Json(json!({})))
    } else {
        status(StatusCode::NOT_FOUND, "not found")
    }
}

async fn client() -> KubeClient {
    let app = Router::new()
        .route("/api/v1/namespaces", post(create_namespace))
        .route(
            "/api/v1/namespaces/{name}",
            get(get_namespace).delete(delete_namespace),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let raw = format!(
        r#"
apiVersion: v1
kind: Config
clusters:
- name: local
  cluster:
    server: http://{addr}/
users:
- name: local
  user:
    token: {TOKEN}
contexts:
- name: local
  context:
    cluster: local
    user: local
current-context: local
"#
    );
    KubeClient::from_kubeconfig(&Kubeconfig::from_yaml(&raw).unwrap()).unwrap()
}

#[tokio::test]
async fn create_returns_the_stored_object() {
    let client = client().await;
    let key = ResourceKey::namespace_key("fresh");
    let created = client
        .create(&key, &json!({ "metadata": { "name": "fresh" } }))
        .await
        .unwrap();
    assert_eq!(created["metadata"]["uid"], "0000-1111");
}

#[tokio::test]
async fn api_errors_carry_status_and_message() {
    let client = client().await;
    let key = ResourceKey::namespace_key("taken");
    let err = client
        .create(&key, &json!({ "metadata": { "name": "taken" } }))
        .await
        .unwrap_err();
    let ClusterError::Api {
        status, message, ..
    } = err
    else {
        panic!("expected an api error, got {err:?}");
    };
    assert_eq!(status, 409);
    assert_eq!(message, "namespaces \"taken\" already exists");
}

#[tokio::test]
async fn missing_objects_are_not_errors() {
    let client = client().await;
    let present = ResourceKey::namespace_key("present");
    let absent = ResourceKey::namespace_key("absent");

    assert!(client.get(&present).await.unwrap().is_some());
    assert!(client.get(&absent).await.unwrap().is_none());
    assert!(client.delete(&present).await.unwrap());
    assert!(!client.delete(&absent).await.unwrap());
}

#[test]
fn users_without_credentials_are_rejected() {
    let mut config = Kubeconfig::single("c", "https://k8s:6443", "", "tok", "ns1");
    config.clusters[0].cluster.certificate_authority_data = None;
    config.users[0].user.token = None;
    let err = KubeClient::from_kubeconfig(&config).unwrap_err();
    assert!(matches!(err, ClusterError::Configuration(_)));

    let key = ResourceKey::namespaced(ResourceKind::Service, "ns1", "svc");
    assert_eq!(key.to_string(), "Service/ns1/svc");
}
