#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgb, RgbImage};
use imagerouter_studio::{
    error::TransportError, ControllerOptions, GenerationController, GenerationEvent, HttpReply, HttpTransport,
};
use std::{
    io::Cursor,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::{mpsc::UnboundedReceiver, Notify};

#[derive(Debug, Clone)]
pub struct RecordedPost {
    pub url: String,
    pub bearer: String,
    pub body: serde_json::Value,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RecordedGet {
    pub url: String,
    pub timeout: Duration,
}

#[derive(Clone)]
enum Canned {
    Reply(u16, Bytes),
    Timeout,
    Refused,
}

impl Canned {
    fn produce(&self) -> Result<HttpReply, TransportError> {
        match self {
            Canned::Reply(status, body) => Ok(HttpReply { status: *status, body: body.clone() }),
            Canned::Timeout => Err(TransportError::Timeout("operation timed out".into())),
            Canned::Refused => Err(TransportError::Http("connection refused".into())),
        }
    }
}

/// In-memory stand-in for the generation API and the image host.
#[derive(Clone)]
pub struct TestTransport {
    generate: Arc<Mutex<Canned>>,
    download: Arc<Mutex<Canned>>,
    gate: Arc<Mutex<Option<Arc<Notify>>>>,
    posts: Arc<Mutex<Vec<RecordedPost>>>,
    gets: Arc<Mutex<Vec<RecordedGet>>>,
}

impl TestTransport {
    pub fn new() -> Self {
        Self {
            generate: Arc::new(Mutex::new(Canned::Reply(500, Bytes::from_static(b"not configured")))),
            download: Arc::new(Mutex::new(Canned::Reply(404, Bytes::new()))),
            gate: Arc::new(Mutex::new(None)),
            posts: Arc::new(Mutex::new(vec![])),
            gets: Arc::new(Mutex::new(vec![])),
        }
    }

    pub fn with_generate_json(self, status: u16, body: serde_json::Value) -> Self {
        self.set_generate_json(status, body);
        self
    }

    pub fn set_generate_json(&self, status: u16, body: serde_json::Value) {
        *self.generate.lock().unwrap() = Canned::Reply(status, Bytes::from(body.to_string()));
    }

    pub fn with_generate_raw(self, status: u16, body: &str) -> Self {
        *self.generate.lock().unwrap() = Canned::Reply(status, Bytes::from(body.to_string()));
        self
    }

    pub fn with_generate_timeout(self) -> Self {
        *self.generate.lock().unwrap() = Canned::Timeout;
        self
    }

    pub fn with_download(self, status: u16, body: Vec<u8>) -> Self {
        *self.download.lock().unwrap() = Canned::Reply(status, Bytes::from(body));
        self
    }

    pub fn with_download_refused(self) -> Self {
        *self.download.lock().unwrap() = Canned::Refused;
        self
    }

    /// Makes the next generate calls wait until the returned handle is notified.
    pub fn gate_generate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }

    pub fn posts(&self) -> Vec<RecordedPost> {
        self.posts.lock().unwrap().clone()
    }

    pub fn gets(&self) -> Vec<RecordedGet> {
        self.gets.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for TestTransport {
    async fn post_json(
        &self,
        url: &str,
        bearer: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<HttpReply, TransportError> {
        self.posts.lock().unwrap().push(RecordedPost {
            url: url.to_string(),
            bearer: bearer.to_string(),
            body: body.clone(),
            timeout,
        });
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let canned = self.generate.lock().unwrap().clone();
        canned.produce()
    }

    async fn get_bytes(&self, url: &str, timeout: Duration) -> Result<HttpReply, TransportError> {
        self.gets.lock().unwrap().push(RecordedGet { url: url.to_string(), timeout });
        let canned = self.download.lock().unwrap().clone();
        canned.produce()
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Jpeg)
}

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 90]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn options(dir: &Path) -> ControllerOptions {
    ControllerOptions {
        api_base: "http://router.test".into(),
        artifact_dir: dir.to_path_buf(),
        generate_timeout: Duration::from_secs(60),
        download_timeout: Duration::from_secs(30),
    }
}

pub fn controller(
    transport: &TestTransport,
    dir: &Path,
) -> (GenerationController<TestTransport>, UnboundedReceiver<GenerationEvent>) {
    GenerationController::new(transport.clone(), options(dir))
}

pub async fn next_event(rx: &mut UnboundedReceiver<GenerationEvent>) -> GenerationEvent {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for a lifecycle event")
        .expect("event channel closed")
}

pub fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
