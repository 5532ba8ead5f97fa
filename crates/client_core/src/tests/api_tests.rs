use std::sync::Arc;

use super::*;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{json, Value};
use shared::{
    domain::{CommentId, UserId},
    error::ErrorCode,
};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    auth: Option<String>,
    body: Value,
}

#[derive(Clone, Default)]
struct ServerState {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

async fn handle(
    State(state): State<ServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state.requests.lock().await.push(Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        auth,
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    match (method.as_str(), uri.path()) {
        ("GET", "/article") => Json(json!([{
            "id": 12,
            "creator": { "id": 2, "name": "bo" },
            "content": "hello",
            "photos": [],
            "createdAt": "2024-03-01T10:00:00Z",
            "isLiked": false,
            "likeNumber": 10,
            "isBookmarked": false,
            "commentNumber": 0
        }]))
        .into_response(),
        ("POST", "/comment") => Json(json!({
            "id": 77,
            "content": "nice",
            "createdAt": "2024-03-01T10:05:00Z",
            "creator": { "id": 1, "name": "mina", "avatar": null }
        }))
        .into_response(),
        ("DELETE", path) if path.starts_with("/article/") => (
            StatusCode::FORBIDDEN,
            Json(json!({ "code": "forbidden", "message": "not your article" })),
        )
            .into_response(),
        ("PATCH", "/user") => (StatusCode::INTERNAL_SERVER_ERROR, "oops").into_response(),
        ("POST", "/auth/verify") => Json(json!({
            "token": "issued-token",
            "user": { "id": 1, "name": "mina", "avatar": null, "introduce": null }
        }))
        .into_response(),
        _ => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn spawn_feed_server() -> anyhow::Result<(Url, ServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new().fallback(handle).with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((Url::parse(&format!("http://{addr}"))?, state))
}

#[tokio::test]
async fn like_requests_carry_article_id_and_token() {
    let (server_url, state) = spawn_feed_server().await.expect("spawn server");
    let api = HttpFeedApi::new(server_url).with_access_token(Some("t0".into()));

    api.create_like(ArticleId(12)).await.expect("create like");
    api.remove_bookmark(ArticleId(12)).await.expect("remove bookmark");

    let requests = state.requests.lock().await;
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/like");
    assert_eq!(requests[0].body, json!({ "articleId": 12 }));
    assert_eq!(requests[0].auth.as_deref(), Some("Bearer t0"));
    assert_eq!(requests[1].method, "DELETE");
    assert_eq!(requests[1].path, "/bookmark");
}

#[tokio::test]
async fn create_comment_returns_server_fields() {
    let (server_url, state) = spawn_feed_server().await.expect("spawn server");
    let api = HttpFeedApi::new(server_url);

    let comment = api
        .create_comment(CreateCommentRequest {
            article_id: ArticleId(12),
            content: "nice".into(),
        })
        .await
        .expect("comment");

    assert_eq!(comment.id, CommentId(77));
    assert_eq!(comment.creator.id, UserId(1));
    let requests = state.requests.lock().await;
    assert_eq!(requests[0].body, json!({ "articleId": 12, "content": "nice" }));
    assert_eq!(requests[0].auth, None);
}

#[tokio::test]
async fn list_articles_decodes_feed() {
    let (server_url, _state) = spawn_feed_server().await.expect("spawn server");
    let api = HttpFeedApi::new(server_url);

    let articles = api.list_articles().await.expect("articles");

    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].id, ArticleId(12));
    assert_eq!(articles[0].like_number, 10);
}

#[tokio::test]
async fn structured_error_body_becomes_api_exception() {
    let (server_url, state) = spawn_feed_server().await.expect("spawn server");
    let api = HttpFeedApi::new(server_url);

    let err = api.remove_article(ArticleId(5)).await.expect_err("must fail");

    let rejected = err.downcast_ref::<ApiException>().expect("api exception");
    assert_eq!(rejected.code, ErrorCode::Forbidden);
    assert_eq!(rejected.message, "not your article");
    assert_eq!(state.requests.lock().await[0].path, "/article/5");
}

#[tokio::test]
async fn unstructured_error_reports_status() {
    let (server_url, _state) = spawn_feed_server().await.expect("spawn server");
    let api = HttpFeedApi::new(server_url);

    let err = api
        .patch_user(PatchUserRequest {
            name: "mina".into(),
            introduce: String::new(),
        })
        .await
        .expect_err("must fail");

    assert!(err.downcast_ref::<ApiException>().is_none());
    assert!(err.to_string().contains("500"), "unexpected error: {err}");
}

#[tokio::test]
async fn verify_key_stores_token_until_session_cleared() {
    let (server_url, state) = spawn_feed_server().await.expect("spawn server");
    let api = HttpFeedApi::new(server_url);

    api.send_secret(ChallengeKind::LogIn, "mina@example.com")
        .await
        .expect("send secret");
    let response = api
        .verify_key(VerifyKeyRequest {
            email: "mina@example.com".into(),
            secret_key: "123456".into(),
        })
        .await
        .expect("verify");
    api.create_like(ArticleId(1)).await.expect("like");
    api.clear_session();
    api.create_like(ArticleId(1)).await.expect("like");

    assert_eq!(response.user.name, "mina");
    let requests = state.requests.lock().await;
    assert_eq!(requests[0].path, "/auth/secret/login");
    assert_eq!(requests[0].body, json!({ "email": "mina@example.com" }));
    assert_eq!(requests[1].body, json!({ "email": "mina@example.com", "secretKey": "123456" }));
    assert_eq!(requests[2].auth.as_deref(), Some("Bearer issued-token"));
    assert_eq!(requests[3].auth, None);
}

#[test]
fn endpoints_resolve_under_base_path() {
    let api = HttpFeedApi::new(Url::parse("http://127.0.0.1:4000/api").expect("url"));

    let request = api
        .request(Method::POST, "comment")
        .expect("builder")
        .build()
        .expect("request");

    assert_eq!(request.url().as_str(), "http://127.0.0.1:4000/api/comment");
}
