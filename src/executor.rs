// Command validation and dispatch on the robot side

use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::messages::{Action, Command, CommandAck};
use crate::motor::{Actuator, DriveError};
use crate::watchdog::SafetyWatchdog;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("no JSON body")]
    EmptyBody,

    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("command must be a JSON object")]
    NotAnObject,

    #[error("missing action")]
    MissingAction,

    #[error("action '{0}' not valid")]
    UnknownAction(String),

    #[error("speed must be an integer, got {0}")]
    InvalidSpeed(Value),

    #[error("motor drive failed: {0}")]
    Drive(#[from] DriveError),
}

impl CommandError {
    /// True if the request itself was at fault (HTTP 400)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, CommandError::Drive(_))
    }
}

/// Parse a raw `POST /command` body.
///
/// Speed is clamped to 0..=255 rather than rejected. A missing speed means
/// `default_speed`.
pub fn parse_command(raw: &[u8], default_speed: u8) -> Result<Command, CommandError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(CommandError::EmptyBody);
    }

    let value: Value = serde_json::from_slice(raw)?;
    let body = value.as_object().ok_or(CommandError::NotAnObject)?;

    let action = match body.get("action") {
        None | Some(Value::Null) => return Err(CommandError::MissingAction),
        Some(Value::String(name)) => name
            .parse::<Action>()
            .map_err(|e| CommandError::UnknownAction(e.0))?,
        Some(other) => return Err(CommandError::UnknownAction(other.to_string())),
    };

    let speed = match body.get("speed") {
        None | Some(Value::Null) => default_speed,
        Some(raw_speed) => clamp_speed(raw_speed)?,
    };

    Ok(Command { action, speed })
}

fn clamp_speed(value: &Value) -> Result<u8, CommandError> {
    let speed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| CommandError::InvalidSpeed(value.clone()))?;

    Ok(speed.clamp(0, u8::MAX as i64) as u8)
}

/// Validates commands and maps them onto the actuator.
///
/// Every accepted command rearms the watchdog in the same critical section
/// that drives the motors.
pub struct CommandExecutor {
    watchdog: SafetyWatchdog<Actuator>,
    default_speed: u8,
}

impl CommandExecutor {
    /// Create the executor and arm the watchdog right away, so a robot that
    /// never hears from an operator still settles into Stop.
    /// Must be called from within a tokio runtime.
    pub fn new(actuator: Actuator, watchdog_interval: Duration, default_speed: u8) -> Self {
        let watchdog = SafetyWatchdog::new(actuator, watchdog_interval);
        watchdog.arm();
        info!(
            "Command executor ready: {}ms watchdog, default speed {}",
            watchdog_interval.as_millis(),
            default_speed
        );
        Self {
            watchdog,
            default_speed,
        }
    }

    /// Validate a raw request body and dispatch it
    pub fn execute(&self, raw: &[u8]) -> Result<CommandAck, CommandError> {
        let command = parse_command(raw, self.default_speed).inspect_err(|e| {
            warn!("Rejected command: {}", e);
        })?;
        self.dispatch(command)
    }

    /// Dispatch an already validated command
    pub fn dispatch(&self, command: Command) -> Result<CommandAck, CommandError> {
        info!("► {:<8}  speed={}", command.action, command.speed);
        self.watchdog
            .feed(|actuator| actuator.apply(command.action, command.speed))?;
        Ok(CommandAck::ok(command.action))
    }

    /// Stop unconditionally. Never fails: a drive error is only logged.
    pub fn emergency_stop(&self) {
        warn!("⚠ EMERGENCY STOP");
        self.watchdog.with(|actuator| {
            if let Err(e) = actuator.stop() {
                error!("Emergency stop failed: {}", e);
            }
        });
    }

    pub fn current_action(&self) -> Action {
        self.watchdog.with(|actuator| actuator.current_action())
    }

    pub fn is_simulated(&self) -> bool {
        self.watchdog.with(|actuator| actuator.is_simulated())
    }

    pub fn watchdog(&self) -> &SafetyWatchdog<Actuator> {
        &self.watchdog
    }
}
