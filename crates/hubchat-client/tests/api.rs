//! REST flows against an in-process axum backend.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use hubchat_client::error::ApiError;
use hubchat_client::routes::Route;
use hubchat_client::storage::{FileStorage, KeyValueStore};
use hubchat_client::{ChatApp, ClientConfig};
use hubchat_shared::constants::{STORAGE_KEY_TOKEN, STORAGE_KEY_USERNAME, STORAGE_KEY_USER_ID};
use hubchat_shared::{Session, UserId};

#[derive(Clone, Default)]
struct Backend {
    authorization: Arc<Mutex<Vec<Option<String>>>>,
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["password"] == "secret" {
        Json(json!({"token": "tok-ana", "userId": 1, "username": body["username"]})).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({"message": "Invalid credentials"}))).into_response()
    }
}

async fn register(Json(body): Json<Value>) -> Response {
    if body["username"] == "taken" {
        (StatusCode::CONFLICT, "Username already exists").into_response()
    } else {
        Json(json!({"token": "tok-new", "userId": 7, "username": body["username"]})).into_response()
    }
}

async fn users(State(backend): State<Backend>, headers: HeaderMap) -> Response {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    backend.authorization.lock().unwrap().push(auth.clone());

    if auth.as_deref() != Some("Bearer tok-ana") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!([
        {"id": 1, "username": "ana"},
        {"id": 2, "username": "bob"}
    ]))
    .into_response()
}

async fn spawn_backend() -> (SocketAddr, Backend) {
    let backend = Backend::default();
    let router = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/users", get(users))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, backend)
}

fn app_in(dir: &TempDir, addr: SocketAddr) -> ChatApp {
    let config = ClientConfig {
        api_base_url: format!("http://{addr}/api/"),
        data_dir: Some(dir.path().to_path_buf()),
        ..ClientConfig::default()
    };
    ChatApp::new(config).unwrap()
}

fn reopen(dir: &TempDir) -> FileStorage {
    FileStorage::in_dir(dir.path()).unwrap()
}

#[tokio::test]
async fn login_persists_session_and_authorizes_requests() {
    let (addr, backend) = spawn_backend().await;
    let dir = TempDir::new().unwrap();
    let app = app_in(&dir, addr);

    let session = app.auth().login("ana", "secret").await.unwrap();
    assert_eq!(session.user_id, UserId(1));

    let stored = reopen(&dir);
    assert_eq!(stored.get(STORAGE_KEY_TOKEN).as_deref(), Some("tok-ana"));
    assert_eq!(stored.get(STORAGE_KEY_USER_ID).as_deref(), Some("1"));
    assert_eq!(stored.get(STORAGE_KEY_USERNAME).as_deref(), Some("ana"));

    let users = app.directory().fetch_users().await.unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(
        backend.authorization.lock().unwrap().last().cloned().flatten().as_deref(),
        Some("Bearer tok-ana")
    );
}

#[tokio::test]
async fn rejected_login_reports_server_message() {
    let (addr, _) = spawn_backend().await;
    let dir = TempDir::new().unwrap();
    let app = app_in(&dir, addr);

    match app.auth().login("ana", "wrong").await {
        Err(ApiError::Status { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid credentials");
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert!(!app.session().is_authenticated());
}

#[tokio::test]
async fn register_signs_in_and_plain_text_errors_surface() {
    let (addr, _) = spawn_backend().await;
    let dir = TempDir::new().unwrap();
    let app = app_in(&dir, addr);

    match app.auth().register("taken", "pw").await {
        Err(ApiError::Status { status, message }) => {
            assert_eq!(status, 409);
            assert_eq!(message, "Username already exists");
        }
        other => panic!("unexpected result {other:?}"),
    }

    let session = app.auth().register("newbie", "pw").await.unwrap();
    assert_eq!(session.user_id, UserId(7));
    assert_eq!(app.session().current(), Some(session));
}

#[tokio::test]
async fn unauthorized_response_clears_session_and_routes_to_login() {
    let (addr, backend) = spawn_backend().await;
    let dir = TempDir::new().unwrap();
    let app = app_in(&dir, addr);

    app.session()
        .save(&Session {
            user_id: UserId(1),
            username: "ana".into(),
            credential: "expired".into(),
        })
        .unwrap();

    let result = app.directory().fetch_users().await;
    assert!(matches!(result, Err(ApiError::Unauthorized)));
    assert_eq!(
        backend.authorization.lock().unwrap().last().cloned().flatten().as_deref(),
        Some("Bearer expired")
    );

    let stored = reopen(&dir);
    assert!(stored.get(STORAGE_KEY_TOKEN).is_none());
    assert!(stored.get(STORAGE_KEY_USER_ID).is_none());
    assert!(stored.get(STORAGE_KEY_USERNAME).is_none());
    assert_eq!(app.router().current(), Route::Login);
}

#[tokio::test]
async fn requests_without_session_carry_no_credential() {
    let (addr, backend) = spawn_backend().await;
    let dir = TempDir::new().unwrap();
    let app = app_in(&dir, addr);

    assert!(matches!(
        app.directory().fetch_users().await,
        Err(ApiError::Unauthorized)
    ));
    assert_eq!(*backend.authorization.lock().unwrap(), vec![None]);
}

#[tokio::test]
async fn logout_clears_the_stored_session() {
    let (addr, _) = spawn_backend().await;
    let dir = TempDir::new().unwrap();
    let app = app_in(&dir, addr);

    app.auth().login("ana", "secret").await.unwrap();
    app.auth().logout().unwrap();

    assert!(!app.session().is_authenticated());
    assert!(reopen(&dir).get(STORAGE_KEY_TOKEN).is_none());
}
