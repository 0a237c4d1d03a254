//! End-to-end tests for the HTTP API.
//!
//! Each test starts the router on an ephemeral port backed by a fresh
//! SQLite file and talks to it over real HTTP.

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;

use threadkeep::auth::issue_session_token;
use threadkeep::config::Config;
use threadkeep::server::{build_router, AppState};
use threadkeep::store::SqliteStore;
use threadkeep::{db, migrate};

const CONV_1: &str = "5e1d0a4c-1111-4c2b-9a1e-000000000001";
const CONV_2: &str = "5e1d0a4c-1111-4c2b-9a1e-000000000002";
const CONV_3: &str = "5e1d0a4c-1111-4c2b-9a1e-000000000003";

struct TestServer {
    _tmp: TempDir,
    base: String,
    config: Config,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("data").join("threadkeep.sqlite");
        config.auth.secret = "http-test-secret".to_string();

        let pool = db::connect(&config).await.unwrap();
        migrate::apply_schema(&pool).await.unwrap();
        let state = AppState::new(config.clone(), Arc::new(SqliteStore::new(pool)));
        let app = build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            _tmp: tmp,
            base: format!("http://{}", addr),
            config,
            client: reqwest::Client::new(),
        }
    }

    fn token(&self, user: &str) -> String {
        issue_session_token(
            &self.config.auth.secret,
            user,
            3600,
            chrono::Utc::now().timestamp(),
        )
        .unwrap()
    }

    async fn sync(&self, token: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}/sync", self.base))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let resp = self
            .client
            .get(format!("{}{}", self.base, path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }
}

fn synced(conversations: u64, messages: u64, files: u64) -> Value {
    json!({
        "success": true,
        "synced": { "conversations": conversations, "messages": messages, "files": files }
    })
}

/// Drops fields that legitimately change between syncs of the same batch.
fn without_sync_stamps(mut conv: Value) -> Value {
    let obj = conv.as_object_mut().unwrap();
    obj.remove("updatedAt");
    if let Some(meta) = obj.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.remove("syncedAt");
    }
    conv
}

#[tokio::test]
async fn test_health_needs_no_auth() {
    let server = TestServer::start().await;
    let resp = reqwest::get(format!("{}/health", server.base)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_sync_requires_auth() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .post(format!("{}/sync", server.base))
        .json(&json!({ "conversations": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unauthorized");

    let (status, _) = server.sync("tk1.bogus.1.00", json!({ "conversations": [] })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_structurally_invalid_body_is_rejected() {
    let server = TestServer::start().await;
    let token = server.token("alice");

    let (status, body) = server.sync(&token, json!({ "files": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = server.sync(&token, json!({ "conversations": "nope" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let resp = server
        .client
        .post(format!("{}/sync", server.base))
        .bearer_auth(&token)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_batch_succeeds() {
    let server = TestServer::start().await;
    let token = server.token("alice");

    let (status, body) = server.sync(&token, json!({ "conversations": [] })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, synced(0, 0, 0));
}

#[tokio::test]
async fn test_code_extraction() {
    let server = TestServer::start().await;
    let token = server.token("alice");

    let body = json!({ "conversations": [{
        "id": CONV_1,
        "platform": "chatgpt",
        "messages": [
            { "sender": "assistant",
              "content": "First:\n```py\nprint(1)\n```\nSecond:\n```py\nprint(2)\n```" },
            { "sender": "user", "content": "thanks, no code here" }
        ]
    }]});
    let (status, resp) = server.sync(&token, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp, synced(1, 2, 0));

    let (status, conv) = server.get(&token, &format!("/conversations/{}", CONV_1)).await;
    assert_eq!(status, StatusCode::OK);
    let messages = conv["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["hasCode"], true);
    assert_eq!(messages[0]["codeBlocks"].as_array().unwrap().len(), 2);
    assert_eq!(messages[1]["hasCode"], false);
    assert_eq!(messages[1]["codeBlocks"], json!([]));
}

#[tokio::test]
async fn test_same_batch_twice_is_idempotent() {
    let server = TestServer::start().await;
    let token = server.token("alice");

    let body = json!({
        "conversations": [{
            "id": CONV_1,
            "platform": "claude",
            "title": "Lifetimes",
            "firstMessageAt": "2026-02-01T08:00:00Z",
            "lastMessageAt": "2026-02-01T08:10:00Z",
            "project": "learning",
            "tags": ["rust"],
            "codeBlocks": [{}],
            "messages": [
                { "id": "7d7d7d7d-0000-4000-8000-000000000001", "sender": "user", "content": "why 'a?" },
                { "id": "7d7d7d7d-0000-4000-8000-000000000002", "sender": "assistant",
                  "content": "```rust\nfn f<'a>(x: &'a str) -> &'a str { x }\n```" }
            ]
        }],
        "files": [{ "id": "8e8e8e8e-0000-4000-8000-000000000001", "conversationId": CONV_1,
                    "filename": "lib.rs", "size": 10 }]
    });

    let (_, first) = server.sync(&token, body.clone()).await;
    let (_, conv_first) = server.get(&token, &format!("/conversations/{}", CONV_1)).await;
    let (_, second) = server.sync(&token, body).await;
    let (_, conv_second) = server.get(&token, &format!("/conversations/{}", CONV_1)).await;

    assert_eq!(first, synced(1, 2, 1));
    assert_eq!(first, second);
    assert_eq!(without_sync_stamps(conv_first), without_sync_stamps(conv_second));

    let (_, list) = server.get(&token, "/conversations").await;
    assert_eq!(list["conversations"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_conversation_is_skipped() {
    let server = TestServer::start().await;
    let token = server.token("alice");

    let body = json!({ "conversations": [
        { "id": CONV_1, "messages": [{ "content": "one" }] },
        { "id": "definitely-not-a-uuid", "messages": [{ "content": "two" }] },
        { "id": CONV_3, "messages": [{ "content": "three" }] }
    ]});
    let (status, resp) = server.sync(&token, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp, synced(2, 2, 0));

    let (status, _) = server.get(&token, &format!("/conversations/{}", CONV_3)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_file_alias_names_store_identically() {
    let server = TestServer::start().await;
    let token = server.token("alice");

    let body = json!({
        "conversations": [{ "id": CONV_2, "title": "Files" }],
        "files": [
            { "id": "4f4f4f4f-0000-4000-8000-000000000001", "conversationId": CONV_2,
              "filename": "report.pdf", "type": "application/pdf", "size": 2048,
              "url": "https://files.example.com/report.pdf", "platform": "gemini" },
            { "id": "4f4f4f4f-0000-4000-8000-000000000002", "conversationId": CONV_2,
              "name": "report.pdf", "fileType": "application/pdf", "fileSize": 2048,
              "sourceUrl": "https://files.example.com/report.pdf", "platform": "gemini" }
        ]
    });
    let (_, resp) = server.sync(&token, body).await;
    assert_eq!(resp, synced(1, 0, 2));

    let (_, conv) = server.get(&token, &format!("/conversations/{}", CONV_2)).await;
    let mut files = conv["files"].as_array().unwrap().clone();
    assert_eq!(files.len(), 2);
    for f in &mut files {
        f.as_object_mut().unwrap().remove("id");
    }
    assert_eq!(files[0], files[1]);
    assert_eq!(files[0]["filename"], "report.pdf");
    assert_eq!(files[0]["size"], 2048);
}

#[tokio::test]
async fn test_owners_are_isolated() {
    let server = TestServer::start().await;
    let alice = server.token("alice");
    let bob = server.token("bob");

    let body = json!({ "conversations": [{ "id": CONV_1, "title": "Alice's",
                                            "messages": [{ "content": "secret" }] }] });
    server.sync(&alice, body).await;

    let (status, _) = server.get(&bob, &format!("/conversations/{}", CONV_1)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, list) = server.get(&bob, "/conversations").await;
    assert_eq!(list["conversations"], json!([]));

    let hijack = json!({ "conversations": [{ "id": CONV_1, "title": "Bob's now" }] });
    let (status, resp) = server.sync(&bob, hijack).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp, synced(0, 0, 0));

    let (_, conv) = server.get(&alice, &format!("/conversations/{}", CONV_1)).await;
    assert_eq!(conv["title"], "Alice's");

    let resp = server
        .client
        .delete(format!("{}/conversations/{}", server.base, CONV_1))
        .bearer_auth(&bob)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_message_and_file_ids_stay_with_their_owner() {
    let server = TestServer::start().await;
    let alice = server.token("alice");
    let bob = server.token("bob");
    let msg = "7b7b7b7b-0000-4000-8000-000000000001";
    let file = "8c8c8c8c-0000-4000-8000-000000000001";

    let body = json!({
        "conversations": [{ "id": CONV_1, "messages": [{ "id": msg, "content": "secret" }] }],
        "files": [{ "id": file, "conversationId": CONV_1, "filename": "a" }]
    });
    let (_, resp) = server.sync(&alice, body).await;
    assert_eq!(resp, synced(1, 1, 1));

    // Bob's own conversation carrying alice's message and file ids.
    let reuse = json!({
        "conversations": [{ "id": CONV_2, "messages": [{ "id": msg, "content": "stolen" }] }],
        "files": [{ "id": file, "conversationId": CONV_2, "filename": "b" }]
    });
    let (status, resp) = server.sync(&bob, reuse).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp, synced(1, 0, 0));

    let (_, conv) = server.get(&alice, &format!("/conversations/{}", CONV_1)).await;
    assert_eq!(conv["messages"][0]["content"], "secret");
    assert_eq!(conv["files"][0]["filename"], "a");

    let (_, conv) = server.get(&bob, &format!("/conversations/{}", CONV_2)).await;
    assert_eq!(conv["messages"], json!([]));
    assert_eq!(conv["files"], json!([]));
}

#[tokio::test]
async fn test_anonymous_device_token() {
    let server = TestServer::start().await;
    let device = "anon_2b8f0c1e-7a4d-4e0b-9c3f-5d6e7f8a9b0c";

    let body = json!({ "conversations": [{ "id": CONV_1 }] });
    let (status, resp) = server.sync(device, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp, synced(1, 0, 0));

    let (_, list) = server.get(device, "/conversations").await;
    assert_eq!(list["conversations"][0]["id"], CONV_1);
    assert_eq!(list["conversations"][0]["title"], "Untitled Conversation");
}

#[tokio::test]
async fn test_delete_removes_messages() {
    let server = TestServer::start().await;
    let token = server.token("alice");

    let body = json!({
        "conversations": [{ "id": CONV_1, "messages": [{ "content": "bye" }] }],
        "files": [{ "id": "6a6a6a6a-0000-4000-8000-000000000001", "conversationId": CONV_1 }]
    });
    server.sync(&token, body).await;

    let resp = server
        .client
        .delete(format!("{}/conversations/{}", server.base, CONV_1))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"], CONV_1);

    let (status, _) = server.get(&token, &format!("/conversations/{}", CONV_1)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Re-syncing the same id recreates it from scratch.
    let (_, resp) = server
        .sync(&token, json!({ "conversations": [{ "id": CONV_1 }] }))
        .await;
    assert_eq!(resp, synced(1, 0, 0));
    let (_, conv) = server.get(&token, &format!("/conversations/{}", CONV_1)).await;
    assert_eq!(conv["messages"], json!([]));
    assert_eq!(conv["files"], json!([]));
}

#[tokio::test]
async fn test_list_limit() {
    let server = TestServer::start().await;
    let token = server.token("alice");

    let body = json!({ "conversations": [
        { "id": CONV_1 }, { "id": CONV_2 }, { "id": CONV_3 }
    ]});
    server.sync(&token, body).await;

    let (status, list) = server.get(&token, "/conversations?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["conversations"].as_array().unwrap().len(), 2);

    let (status, _) = server.get(&token, "/conversations?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = server.get(&token, "/conversations?limit=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}
