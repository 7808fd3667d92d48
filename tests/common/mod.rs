//! In-process stand-in for the ComfyUI endpoints the crate talks to.
#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub const PROMPT_ID: &str = "job-1";

pub struct FakeComfy {
    /// Number of polls answered with an empty history before the entry shows up.
    pub history_ready_after: usize,
    pub fail_history: bool,
    pub omit_prompt_id: bool,
    pub image: Vec<u8>,
    pub queued: Mutex<Vec<Value>>,
    pub history_polls: Mutex<Vec<Instant>>,
    pub views: Mutex<Vec<HashMap<String, String>>>,
}

impl Default for FakeComfy {
    fn default() -> Self {
        FakeComfy {
            history_ready_after: 0,
            fail_history: false,
            omit_prompt_id: false,
            image: b"fake image bytes".to_vec(),
            queued: Mutex::new(Vec::new()),
            history_polls: Mutex::new(Vec::new()),
            views: Mutex::new(Vec::new()),
        }
    }
}

impl FakeComfy {
    pub fn queued(&self) -> Vec<Value> {
        self.queued.lock().unwrap().clone()
    }

    pub fn polls(&self) -> Vec<Instant> {
        self.history_polls.lock().unwrap().clone()
    }
}

async fn queue(State(fake): State<Arc<FakeComfy>>, Json(body): Json<Value>) -> Json<Value> {
    let number = {
        let mut queued = fake.queued.lock().unwrap();
        queued.push(body);
        queued.len()
    };
    if fake.omit_prompt_id {
        Json(json!({ "number": number, "node_errors": {} }))
    } else {
        Json(json!({ "prompt_id": PROMPT_ID, "number": number, "node_errors": {} }))
    }
}

async fn history(State(fake): State<Arc<FakeComfy>>, Path(id): Path<String>) -> Response {
    let polls = {
        let mut polls = fake.history_polls.lock().unwrap();
        polls.push(Instant::now());
        polls.len()
    };
    if fake.fail_history {
        return (StatusCode::INTERNAL_SERVER_ERROR, "history unavailable").into_response();
    }
    if polls <= fake.history_ready_after {
        return Json(json!({})).into_response();
    }
    let entry = json!({
        "status": {"completed": true},
        "outputs": {
            "9": {"images": [
                {"filename": "assetgen_00001_.png", "subfolder": "", "type": "output"}
            ]}
        }
    });
    let mut body = serde_json::Map::new();
    body.insert(id, entry);
    Json(Value::Object(body)).into_response()
}

async fn view(
    State(fake): State<Arc<FakeComfy>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    fake.views.lock().unwrap().push(query);
    ([(header::CONTENT_TYPE, "image/png")], fake.image.clone()).into_response()
}

async fn models(Path(category): Path<String>) -> Json<Value> {
    match category.as_str() {
        "checkpoints" => {
            Json(json!(["juggernautXL_v9.safetensors", "animagineXLV31_v31.safetensors"]))
        }
        _ => Json(json!([])),
    }
}

/// Serve `fake` on an ephemeral port and return its base URL.
pub async fn spawn(fake: Arc<FakeComfy>) -> String {
    let app = Router::new()
        .route("/prompt", post(queue))
        .route("/history/:id", get(history))
        .route("/view", get(view))
        .route("/models/:category", get(models))
        .with_state(fake);
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::Server::from_tcp(listener).unwrap().serve(app.into_make_service()).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A small API-format workflow with the usual SDXL node shapes.
pub fn workflow_json() -> Value {
    json!({
        "4": {"class_type": "CheckpointLoaderSimple",
              "inputs": {"ckpt_name": "sd_xl_base_1.0.safetensors"}},
        "5": {"class_type": "EmptyLatentImage",
              "inputs": {"width": 1024, "height": 1024, "batch_size": 1}},
        "6": {"class_type": "CLIPTextEncode", "_meta": {"title": "Positive"},
              "inputs": {"text": "", "clip": ["4", 1]}},
        "7": {"class_type": "CLIPTextEncode", "_meta": {"title": "Negative"},
              "inputs": {"text": "", "clip": ["4", 1]}},
        "3": {"class_type": "KSampler",
              "inputs": {"seed": 5, "steps": 20, "cfg": 7.0, "sampler_name": "euler",
                         "scheduler": "normal", "denoise": 1.0, "model": ["4", 0],
                         "positive": ["6", 0], "negative": ["7", 0], "latent_image": ["5", 0]}},
        "8": {"class_type": "VAEDecode", "inputs": {"samples": ["3", 0], "vae": ["4", 2]}},
        "9": {"class_type": "SaveImage",
              "inputs": {"filename_prefix": "ComfyUI", "images": ["8", 0]}}
    })
}

/// A listener that accepts connections and never answers.
pub async fn spawn_silent() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}
