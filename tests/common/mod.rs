//! In-process stand-in for the validation server plus helpers to drive the controller.
#![allow(dead_code)]

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use drs_validator::api::ValidatorClient;
use drs_validator::config::AppConfig;
use drs_validator::model::{UiEvent, ValidationForm};
use drs_validator::orchestrator::{run_controller, UiCommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

#[derive(Clone)]
pub enum ValidateReply {
    Chunks(Vec<&'static str>),
    /// Hold the response back before streaming, so the run stays in flight.
    Delayed(Duration, Vec<&'static str>),
    Status(u16),
    /// Stream the chunks, then break the body with a read error.
    Broken(Vec<&'static str>),
}

#[derive(Clone)]
pub struct Mock {
    pub validate: ValidateReply,
    pub prevalidate: Value,
    pub batch: Value,
    pub export_fails: bool,
    pub validate_posts: Arc<AtomicUsize>,
    pub results_gets: Arc<AtomicUsize>,
    pub prevalidate_posts: Arc<AtomicUsize>,
    pub bodies: Arc<Mutex<Vec<Value>>>,
    pub uploads: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Mock {
    pub fn new(validate: ValidateReply) -> Self {
        Self {
            validate,
            prevalidate: json!({"success": true}),
            batch: json!({"success": true}),
            export_fails: false,
            validate_posts: Arc::default(),
            results_gets: Arc::default(),
            prevalidate_posts: Arc::default(),
            bodies: Arc::default(),
            uploads: Arc::default(),
        }
    }

    pub fn posts(&self) -> usize {
        self.validate_posts.load(Ordering::SeqCst)
    }
}

pub const EXPORT_CSV: &str = "id,status\nr1,success\nr2,failure\n";

pub fn results_json() -> Value {
    json!([
        {"id": "r1", "timestamp": "2025-10-01T10:00:00", "device_ip": "10.0.0.9", "port": 20000,
         "scenario": "basic", "status": "success", "duration": "12.5s"},
        {"id": "r2", "timestamp": "2025-10-01T11:00:00", "device_ip": "10.0.0.9", "port": 20000,
         "scenario": "stress", "status": "failure"}
    ])
}

async fn validate(State(m): State<Mock>, Json(body): Json<Value>) -> Response {
    m.validate_posts.fetch_add(1, Ordering::SeqCst);
    m.bodies.lock().unwrap().push(body);
    let chunks = match m.validate {
        ValidateReply::Status(code) => {
            return StatusCode::from_u16(code).unwrap().into_response();
        }
        ValidateReply::Chunks(chunks) => chunks,
        ValidateReply::Delayed(delay, chunks) => {
            tokio::time::sleep(delay).await;
            chunks
        }
        ValidateReply::Broken(chunks) => {
            let stream = futures::stream::iter(
                chunks
                    .into_iter()
                    .map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c.as_bytes())))
                    .chain(std::iter::once(Err(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "device link dropped",
                    )))),
            );
            return Body::from_stream(stream).into_response();
        }
    };
    let stream = futures::stream::iter(
        chunks
            .into_iter()
            .map(|c| Ok::<_, std::io::Error>(Bytes::from_static(c.as_bytes()))),
    );
    Body::from_stream(stream).into_response()
}

async fn prevalidate(State(m): State<Mock>, Json(_body): Json<Value>) -> Json<Value> {
    m.prevalidate_posts.fetch_add(1, Ordering::SeqCst);
    Json(m.prevalidate.clone())
}

async fn results(State(m): State<Mock>) -> Json<Value> {
    m.results_gets.fetch_add(1, Ordering::SeqCst);
    Json(results_json())
}

async fn result(Path(id): Path<String>) -> Response {
    if id == "missing" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({"id": id, "status": "success", "device_ip": "10.0.0.9", "port": 20000,
                "commands": [{"name": "ping", "ok": true}]}))
    .into_response()
}

async fn download(Path(id): Path<String>) -> Response {
    if id == "missing" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({"id": id, "status": "success"})).into_response()
}

async fn export(State(m): State<Mock>) -> Response {
    if m.export_fails {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    EXPORT_CSV.into_response()
}

async fn upload(State(m): State<Mock>, body: Bytes) -> Json<Value> {
    m.uploads.lock().unwrap().push(body.to_vec());
    Json(m.batch.clone())
}

/// Serve `mock` on an ephemeral port and return its base URL.
pub async fn spawn_server(mock: Mock) -> String {
    let app = Router::new()
        .route("/api/validate", post(validate))
        .route("/api/prevalidate", post(prevalidate))
        .route("/api/results", get(results))
        .route("/api/results/export", get(export))
        .route("/api/results/{id}", get(result))
        .route("/api/results/{id}/download", get(download))
        .route("/api/batch/upload", post(upload))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Base URL of a port nothing listens on.
pub async fn dead_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn config(url: &str, download_dir: PathBuf) -> AppConfig {
    AppConfig {
        server_url: url.to_string(),
        results_delay: Duration::from_millis(200),
        notification_duration: Duration::from_secs(5),
        download_dir,
        ..AppConfig::default()
    }
}

pub fn form() -> ValidationForm {
    ValidationForm {
        scenario_id: "basic".into(),
        ip_address: "10.0.0.9".into(),
        port: "20000".into(),
        timeout: "30".into(),
        extra: vec![("operator".into(), "ana".into())],
    }
}

pub struct Harness {
    pub cmd_tx: UnboundedSender<UiCommand>,
    pub ui_rx: UnboundedReceiver<UiEvent>,
    pub task: JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    pub fn start(cfg: AppConfig) -> Self {
        let client = ValidatorClient::new(&cfg).unwrap();
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_controller(Arc::new(cfg), client, ui_tx, cmd_rx));
        Self {
            cmd_tx,
            ui_rx,
            task,
        }
    }

    pub fn send(&self, cmd: UiCommand) {
        self.cmd_tx.send(cmd).unwrap();
    }

    /// Collect events up to and including the first one matching `stop`.
    pub async fn until(&mut self, stop: impl Fn(&UiEvent) -> bool) -> Vec<UiEvent> {
        let mut seen = Vec::new();
        let res = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(ev) = self.ui_rx.recv().await {
                let done = stop(&ev);
                seen.push(ev);
                if done {
                    return;
                }
            }
        })
        .await;
        assert!(res.is_ok(), "timed out; events so far: {seen:#?}");
        seen
    }

    /// Whatever arrives within `window`.
    pub async fn drain_for(&mut self, window: Duration) -> Vec<UiEvent> {
        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(ev)) = tokio::time::timeout_at(deadline, self.ui_rx.recv()).await {
            seen.push(ev);
        }
        seen
    }
}

pub fn notifications(events: &[UiEvent]) -> Vec<(drs_validator::model::NotificationKind, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::Notify(n) => Some((n.kind, n.message.clone())),
            _ => None,
        })
        .collect()
}
