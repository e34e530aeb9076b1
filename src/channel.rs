// Operator-side HTTP client for the robot's command server
// Every call is bounded by a short timeout; failures come back as `false`,
// never as errors, so a stalled robot can only delay one control tick.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{COMMAND_TIMEOUT, PING_TIMEOUT, Speeds};
use crate::messages::{Action, Command};

/// What the operator loop needs from the robot
#[async_trait]
pub trait RobotLink: Send + Sync {
    /// True iff the robot accepted the command
    async fn send(&self, command: Command) -> bool;

    /// True iff the robot answered the liveness check
    async fn ping(&self) -> bool;
}

#[async_trait]
impl<T: RobotLink + ?Sized> RobotLink for std::sync::Arc<T> {
    async fn send(&self, command: Command) -> bool {
        (**self).send(command).await
    }

    async fn ping(&self) -> bool {
        (**self).ping().await
    }
}

pub struct CommandChannel {
    client: reqwest::Client,
    base_url: String,
    command_timeout: Duration,
    ping_timeout: Duration,
    speeds: Speeds,
}

impl CommandChannel {
    pub fn new(base_url: impl Into<String>, speeds: Speeds) -> Self {
        Self::with_timeouts(base_url, speeds, COMMAND_TIMEOUT, PING_TIMEOUT)
    }

    pub fn with_timeouts(
        base_url: impl Into<String>,
        speeds: Speeds,
        command_timeout: Duration,
        ping_timeout: Duration,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            command_timeout,
            ping_timeout,
            speeds,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn speeds(&self) -> Speeds {
        self.speeds
    }

    pub async fn forward(&self) -> bool {
        self.send(Command::new(Action::Forward, self.speeds.forward)).await
    }

    pub async fn backward(&self) -> bool {
        self.send(Command::new(Action::Backward, self.speeds.backward)).await
    }

    pub async fn left(&self) -> bool {
        self.send(Command::new(Action::Left, self.speeds.rotation)).await
    }

    pub async fn right(&self) -> bool {
        self.send(Command::new(Action::Right, self.speeds.rotation)).await
    }

    pub async fn stop(&self) -> bool {
        self.send(Command::stop()).await
    }
}

#[async_trait]
impl RobotLink for CommandChannel {
    async fn send(&self, command: Command) -> bool {
        let result = self
            .client
            .post(format!("{}/command", self.base_url))
            .json(&command)
            .timeout(self.command_timeout)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(
                    "[channel] {} rejected: HTTP {}",
                    command.action,
                    response.status()
                );
                false
            }
            Err(e) => {
                debug!("[channel] {} not delivered: {}", command.action, e);
                false
            }
        }
    }

    async fn ping(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/ping", self.base_url))
            .timeout(self.ping_timeout)
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("[channel] ping failed: {}", e);
                false
            }
        }
    }
}
