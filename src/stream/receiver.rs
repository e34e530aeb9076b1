// Background MJPEG receiver for the robot's camera stream
// One task runs a Connecting -> Streaming -> Disconnected loop with a fixed
// retry delay and no retry limit. Errors never leave the task, they only
// show up as the receiver's state. Cancellation is checked during reads and
// during the retry sleep, so `shutdown` returns promptly.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::assembler::{Frame, FrameAssembler};
use super::mailbox::LatestFrameMailbox;
use crate::config::{
    ASSEMBLER_MAX_BUFFER, ASSEMBLER_TAIL_WINDOW, STREAM_CONNECT_TIMEOUT, STREAM_IDLE_TIMEOUT,
    STREAM_RETRY_DELAY,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Streaming,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub url: String,
    pub connect_timeout: Duration,
    /// No bytes for this long counts as an I/O timeout
    pub idle_timeout: Duration,
    pub retry_delay: Duration,
    pub max_buffer: usize,
    pub tail_window: usize,
}

impl ReceiverConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: STREAM_CONNECT_TIMEOUT,
            idle_timeout: STREAM_IDLE_TIMEOUT,
            retry_delay: STREAM_RETRY_DELAY,
            max_buffer: ASSEMBLER_MAX_BUFFER,
            tail_window: ASSEMBLER_TAIL_WINDOW,
        }
    }

    /// `GET /stream` on the robot at `base_url`
    pub fn for_robot(base_url: &str) -> Self {
        Self::new(format!("{}/stream", base_url.trim_end_matches('/')))
    }
}

#[derive(Debug, thiserror::Error)]
enum StreamError {
    #[error("connection failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no response within {0:?}")]
    ConnectTimeout(Duration),

    #[error("server answered HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("no data for {0:?}")]
    Idle(Duration),

    #[error("server closed the stream")]
    Closed,
}

/// Owns the background receive task and the frame mailbox
pub struct StreamReceiver {
    mailbox: Arc<LatestFrameMailbox>,
    state: watch::Receiver<StreamState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StreamReceiver {
    /// Spawn the receive loop. Must be called from within a tokio runtime.
    pub fn start(config: ReceiverConfig) -> Self {
        let mailbox = Arc::new(LatestFrameMailbox::new());
        let (state_tx, state) = watch::channel(StreamState::Connecting);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(receive_loop(
            config,
            Arc::clone(&mailbox),
            state_tx,
            cancel.clone(),
        ));

        Self {
            mailbox,
            state,
            cancel,
            task: Some(task),
        }
    }

    /// Latest unread frame, if any
    pub fn take_frame(&self) -> Option<Arc<Frame>> {
        self.mailbox.take()
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// True while bytes are flowing from the robot
    pub fn is_connected(&self) -> bool {
        self.state() == StreamState::Streaming
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }

    /// Stop the loop and wait for it to finish
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("[stream] receiver task failed: {}", e);
            }
        }
    }
}

impl Drop for StreamReceiver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn receive_loop(
    config: ReceiverConfig,
    mailbox: Arc<LatestFrameMailbox>,
    state: watch::Sender<StreamState>,
    cancel: CancellationToken,
) {
    let client = match reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!("[stream] cannot build HTTP client: {}", e);
            state.send_replace(StreamState::Disconnected);
            return;
        }
    };

    loop {
        state.send_replace(StreamState::Connecting);
        debug!("[stream] connecting to {}", config.url);

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = stream_once(&client, &config, &mailbox, &state) => result,
        };
        let error = result.err().unwrap_or(StreamError::Closed);

        state.send_replace(StreamState::Disconnected);
        warn!(
            "[stream] {} - retrying in {:?}",
            error, config.retry_delay
        );

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(config.retry_delay) => {}
        }
    }

    state.send_replace(StreamState::Disconnected);
    info!("[stream] receiver stopped");
}

/// Read one connection until it fails. Only returns on error or end of stream.
async fn stream_once(
    client: &reqwest::Client,
    config: &ReceiverConfig,
    mailbox: &LatestFrameMailbox,
    state: &watch::Sender<StreamState>,
) -> Result<(), StreamError> {
    let request = client
        .get(&config.url)
        .header(ACCEPT, "multipart/x-mixed-replace")
        .send();
    let response = timeout(config.connect_timeout, request)
        .await
        .map_err(|_| StreamError::ConnectTimeout(config.connect_timeout))??;

    if !response.status().is_success() {
        return Err(StreamError::Status(response.status()));
    }

    let mut assembler = FrameAssembler::with_limits(config.max_buffer, config.tail_window);
    let mut body = response.bytes_stream();

    loop {
        let chunk = match timeout(config.idle_timeout, body.next()).await {
            Err(_) => return Err(StreamError::Idle(config.idle_timeout)),
            Ok(None) => return Ok(()),
            Ok(Some(chunk)) => chunk?,
        };
        if chunk.is_empty() {
            continue;
        }

        if *state.borrow() != StreamState::Streaming {
            state.send_replace(StreamState::Streaming);
            info!("[stream] connected to {}", config.url);
        }

        if let Some(frame) = assembler.ingest(&chunk) {
            debug!("[stream] frame {}x{}", frame.width(), frame.height());
            mailbox.publish(frame);
        }
    }
}
