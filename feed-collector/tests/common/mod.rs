//! Local stand-in for the remote store.

#![allow(dead_code)]

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use feed_collector::{FeedEntry, VirtualFeed};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// A request received by the stub: path and JSON body
#[derive(Debug, Clone)]
pub struct Received {
    pub path: String,
    pub body: Value,
}

#[derive(Clone)]
struct StubState {
    status: StatusCode,
    received: Arc<Mutex<Vec<Received>>>,
}

impl StubState {
    fn record(&self, path: &str, body: Value) {
        self.received.lock().unwrap().push(Received {
            path: path.to_string(),
            body,
        });
    }
}

pub struct StubStore {
    pub url: String,
    received: Arc<Mutex<Vec<Received>>>,
}

impl StubStore {
    /// Answer every request with `status`
    pub async fn start(status: u16) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            status: StatusCode::from_u16(status).unwrap(),
            received: Arc::clone(&received),
        };

        let app = Router::new()
            .route("/api/ingest", post(ingest))
            .route("/api/debug", post(debug))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { url, received }
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}

async fn ingest(
    State(state): State<StubState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let count = body["items"].as_array().map_or(0, |items| items.len());
    state.record("/api/ingest", body);

    let reply = json!({
        "success": true,
        "new_count": count,
        "duplicate_count": 0,
        "failed_count": 0,
        "message": format!("Processed {} items", count),
    });
    (state.status, Json(reply))
}

async fn debug(State(state): State<StubState>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    state.record("/api/debug", body);
    (state.status, Json(json!({ "id": "debug_20240101_000000" })))
}

/// `count` plain items from `/alice/status/100` upwards
pub fn numbered_feed(count: usize) -> VirtualFeed {
    VirtualFeed::new(
        (0..count)
            .map(|i| FeedEntry::tweet("alice", &(100 + i).to_string(), &format!("item {}", i)))
            .collect(),
    )
}
