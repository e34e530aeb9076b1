// Camera feed and MJPEG multipart framing for GET /stream

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::Stream;
use futures_util::stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Multipart boundary between frames
pub const BOUNDARY: &str = "frame";

pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", BOUNDARY)
}

/// Latest encoded frame produced by the camera.
///
/// Stream clients each hold a receiver and only see a frame once it changes.
/// `close` ends every open stream so the server can shut down gracefully.
#[derive(Debug, Clone)]
pub struct CameraFeed {
    tx: Arc<watch::Sender<Option<Bytes>>>,
    closed: CancellationToken,
}

impl Default for CameraFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraFeed {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            closed: CancellationToken::new(),
        }
    }

    /// Replace the current frame
    pub fn publish(&self, jpeg: Bytes) {
        self.tx.send_replace(Some(jpeg));
    }

    /// True once at least one frame has been captured
    pub fn is_active(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Bytes>> {
        self.tx.subscribe()
    }

    /// Multipart body for one `/stream` client
    pub fn stream(&self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        mjpeg_stream(self.subscribe(), self.closed.clone())
    }

    /// End all open streams
    pub fn close(&self) {
        self.closed.cancel();
    }
}

/// Encode one frame as a multipart part
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Endless multipart body: the current frame first, then one part per new frame.
/// Ends when the feed is dropped or `closed` is cancelled.
pub fn mjpeg_stream(
    mut rx: watch::Receiver<Option<Bytes>>,
    closed: CancellationToken,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    rx.mark_changed();
    stream::unfold((rx, closed), |(mut rx, closed)| async move {
        loop {
            tokio::select! {
                _ = closed.cancelled() => return None,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
            let frame = rx.borrow_and_update().clone();
            if let Some(jpeg) = frame {
                return Some((Ok(multipart_part(&jpeg)), (rx, closed)));
            }
        }
    })
}

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("Failed to read frames from {}: {source}", dir.display())]
    Io {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No .jpg/.jpeg files in {}", .0.display())]
    Empty(PathBuf),
}

/// Capture stand-in: loops over the JPEG files of a directory
pub struct FileCamera {
    frames: Vec<Bytes>,
    period: Duration,
}

impl FileCamera {
    pub fn open(dir: &Path, fps: u32) -> Result<Self, CameraError> {
        let io_err = |source: std::io::Error| CameraError::Io {
            dir: dir.to_path_buf(),
            source,
        };

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(io_err)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg")
                    })
            })
            .collect();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            frames.push(Bytes::from(std::fs::read(path).map_err(io_err)?));
        }
        if frames.is_empty() {
            return Err(CameraError::Empty(dir.to_path_buf()));
        }

        info!(
            "File camera: {} frames from {} @{}fps",
            frames.len(),
            dir.display(),
            fps
        );
        Ok(Self {
            frames,
            period: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
        })
    }

    /// Publish frames into `feed` until `token` is cancelled
    pub fn spawn(self, feed: CameraFeed, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.period);
            for frame in self.frames.iter().cycle() {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => feed.publish(frame.clone()),
                }
            }
            info!("Camera released");
        })
    }
}
