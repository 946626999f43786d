use bytes::Bytes;
use chrono::Utc;
use image::ImageFormat;
use rand::Rng;
use std::{
    fmt,
    io::{Cursor, ErrorKind as IoErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use tracing::{error, info, warn};

use crate::{error::PipelineError, transport::HttpTransport};

pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 6;
const MAX_NAME_ATTEMPTS: usize = 8;

/// `image_<unix-seconds>_<suffix>.png`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFilename {
    timestamp: i64,
    suffix: String,
}

impl ArtifactFilename {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix = (0..SUFFIX_LEN)
            .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
            .collect();
        Self { timestamp: Utc::now().timestamp(), suffix }
    }

    /// Parses a name produced by `generate`.
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("image_")?.strip_suffix(".png")?;
        let (ts, suffix) = rest.split_once('_')?;
        if ts.is_empty() || !ts.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if suffix.len() != SUFFIX_LEN || !suffix.bytes().all(|b| SUFFIX_CHARSET.contains(&b)) {
            return None;
        }
        Some(Self { timestamp: ts.parse().ok()?, suffix: suffix.to_string() })
    }
}

impl fmt::Display for ArtifactFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image_{}_{}.png", self.timestamp, self.suffix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub path: PathBuf,
    pub byte_length: u64,
}

/// Downloads generated images and keeps them as PNG files in one directory.
pub struct ArtifactStore<T: HttpTransport> {
    transport: Arc<T>,
    dir: PathBuf,
    timeout: Duration,
}

impl<T: HttpTransport> ArtifactStore<T> {
    pub fn new(transport: Arc<T>, dir: impl Into<PathBuf>) -> Self {
        Self { transport, dir: dir.into(), timeout: DEFAULT_DOWNLOAD_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn fetch_and_store(&self, url: &str) -> Result<StoredArtifact, PipelineError> {
        info!("⬇️ Downloading image from {}", url);
        let reply = self.transport.get_bytes(url, self.timeout).await.map_err(|e| {
            error!("❌ Image download failed: {}", e);
            PipelineError::from(e)
        })?;

        if !reply.is_success() {
            error!("❌ Image host answered {}", reply.status);
            return Err(PipelineError::Transport(format!(
                "image download failed: status={} body={}",
                reply.status,
                reply.text()
            )));
        }

        info!("📦 Downloaded {} bytes", reply.body.len());
        let png = to_png(reply.body).await?;
        self.persist_with(&png, ArtifactFilename::generate).await
    }

    async fn persist_with(
        &self,
        png: &[u8],
        mut next_name: impl FnMut() -> ArtifactFilename,
    ) -> Result<StoredArtifact, PipelineError> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = self.dir.join(next_name().to_string());
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => file,
                Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                    warn!("🔁 {} already exists, drawing a new name", path.display());
                    continue;
                }
                Err(e) => return Err(storage_error(&path, e)),
            };
            let written = async {
                file.write_all(png).await?;
                file.flush().await
            }
            .await;
            drop(file);
            if let Err(e) = written {
                return Err(discard_partial(&path, e).await);
            }

            let path = tokio::fs::canonicalize(&path).await.unwrap_or(path);
            info!("💾 Saved {} ({} bytes)", path.display(), png.len());
            return Ok(StoredArtifact { path, byte_length: png.len() as u64 });
        }
        Err(PipelineError::Storage(format!(
            "could not find a free artifact name in {} after {} attempts",
            self.dir.display(),
            MAX_NAME_ATTEMPTS
        )))
    }
}

/// Removes a half-written artifact so no truncated PNG is left behind.
async fn discard_partial(path: &Path, err: std::io::Error) -> PipelineError {
    if let Err(remove_err) = tokio::fs::remove_file(path).await {
        warn!("🧹 Could not remove partial {}: {}", path.display(), remove_err);
    }
    storage_error(path, err)
}

fn storage_error(path: &Path, err: std::io::Error) -> PipelineError {
    error!("❌ Writing {} failed: {}", path.display(), err);
    PipelineError::Storage(format!("{}: {}", path.display(), err))
}

/// PNG payloads are kept byte-for-byte; other decodable formats are re-encoded.
async fn to_png(body: Bytes) -> Result<Bytes, PipelineError> {
    tokio::task::spawn_blocking(move || {
        let decoded = image::load_from_memory(&body)
            .map_err(|e| PipelineError::Storage(format!("image decode failed: {e}")))?;
        if matches!(image::guess_format(&body), Ok(ImageFormat::Png)) {
            return Ok(body);
        }
        let mut out = Cursor::new(Vec::new());
        decoded
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| PipelineError::Storage(format!("PNG encode failed: {e}")))?;
        Ok(Bytes::from(out.into_inner()))
    })
    .await
    .map_err(|e| PipelineError::Storage(format!("image worker failed: {e}")))?
}
