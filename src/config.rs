// Timeouts, speeds, endpoints, motor calibration
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

// Robot server defaults
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;

// Dead-man's switch: robot stops if no command arrives within this interval
pub const WATCHDOG_INTERVAL: Duration = Duration::from_millis(1000);

// Speed used when a command carries no speed field
pub const DEFAULT_SPEED: u8 = 180;

// Camera stand-in frame rate
pub const CAMERA_FPS: u32 = 30;

// Operator defaults
pub const DEFAULT_ROBOT_HOST: &str = "192.168.1.100";
pub const CONTROL_HZ: u64 = 30;
pub const PING_PERIOD: Duration = Duration::from_secs(3);

// A held key stays active this long after its last press/repeat event.
// Covers the terminal's initial autorepeat delay.
pub const KEY_HOLD_TIMEOUT: Duration = Duration::from_millis(500);

// Request timeouts (must stay well under WATCHDOG_INTERVAL)
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(400);
pub const PING_TIMEOUT: Duration = Duration::from_millis(1000);

// Stream receiver
pub const STREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(10);
pub const STREAM_RETRY_DELAY: Duration = Duration::from_secs(3);

// Frame assembler: trim the buffer to the tail window once it grows past the limit
pub const ASSEMBLER_MAX_BUFFER: usize = 200_000;
pub const ASSEMBLER_TAIL_WINDOW: usize = 50_000;

// Linear speeds. ~40 barely moves the AlphaBot, 255 is full speed.
pub const SPEED_FORWARD: u8 = 80;
pub const SPEED_BACKWARD: u8 = 80;

// Micro-step rotation: low speed plus very short pulses, a few degrees per step
pub const SPEED_ROTATION: u8 = 60;
pub const STEP_PULSE: Duration = Duration::from_millis(80);
pub const STEP_PAUSE: Duration = Duration::from_millis(120);

/// Command line for the on-robot command server
#[derive(Debug, Clone, Parser)]
#[command(name = "alphabot-server", about = "AlphaBot command server and camera stream")]
pub struct ServerArgs {
    #[arg(long, default_value = DEFAULT_BIND_HOST)]
    pub host: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Stop the motors when no command arrives for this long
    #[arg(long, default_value_t = WATCHDOG_INTERVAL.as_millis() as u64)]
    pub watchdog_ms: u64,

    /// Directory of JPEG files looped as the camera feed
    #[arg(long)]
    pub frames_dir: Option<PathBuf>,

    #[arg(long, default_value_t = CAMERA_FPS)]
    pub fps: u32,

    /// Disable the camera stream entirely
    #[arg(long)]
    pub no_cam: bool,

    /// JSON file with per-wheel trim ({"trim_left": .., "trim_right": ..})
    #[arg(long)]
    pub motor_config: Option<PathBuf>,

    /// Use the textbook action table instead of the robot's as-wired one
    #[arg(long)]
    pub nominal_wiring: bool,
}

impl ServerArgs {
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_ms)
    }
}

/// Command line for the operator-side teleop client
#[derive(Debug, Clone, Parser)]
#[command(name = "alphabot-operator", about = "Keyboard teleop for the AlphaBot")]
pub struct OperatorArgs {
    #[arg(long, default_value = DEFAULT_ROBOT_HOST)]
    pub host: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Control loop rate
    #[arg(long, default_value_t = CONTROL_HZ)]
    pub fps: u64,

    #[arg(long, default_value_t = SPEED_FORWARD)]
    pub forward_speed: u8,

    #[arg(long, default_value_t = SPEED_BACKWARD)]
    pub backward_speed: u8,

    #[arg(long, default_value_t = SPEED_ROTATION)]
    pub rotation_speed: u8,

    #[arg(long, default_value_t = STEP_PULSE.as_millis() as u64)]
    pub pulse_ms: u64,

    #[arg(long, default_value_t = STEP_PAUSE.as_millis() as u64)]
    pub pause_ms: u64,

    #[arg(long, default_value_t = PING_PERIOD.as_secs())]
    pub ping_secs: u64,
}

impl OperatorArgs {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn speeds(&self) -> Speeds {
        Speeds {
            forward: self.forward_speed,
            backward: self.backward_speed,
            rotation: self.rotation_speed,
        }
    }

    pub fn step_timing(&self) -> StepTiming {
        StepTiming {
            pulse: Duration::from_millis(self.pulse_ms),
            pause: Duration::from_millis(self.pause_ms),
        }
    }
}

/// Speeds the operator sends for each kind of motion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Speeds {
    pub forward: u8,
    pub backward: u8,
    pub rotation: u8,
}

impl Default for Speeds {
    fn default() -> Self {
        Self {
            forward: SPEED_FORWARD,
            backward: SPEED_BACKWARD,
            rotation: SPEED_ROTATION,
        }
    }
}

/// Pulse/pause lengths for micro-step rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTiming {
    pub pulse: Duration,
    pub pause: Duration,
}

impl Default for StepTiming {
    fn default() -> Self {
        Self {
            pulse: STEP_PULSE,
            pause: STEP_PAUSE,
        }
    }
}

/// Upper bound for a wheel trim multiplier
pub const MAX_TRIM: f32 = 1.5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read motor config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid motor config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Trim {name}={value} outside 0.0..=1.5")]
    TrimOutOfRange { name: &'static str, value: f32 },
}

/// Per-wheel calibration written by the motor calibration procedure.
///
/// A trim below 1.0 slows the stronger wheel so the robot drives straight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    // Files written by the robot's calibration script use sx/dx
    #[serde(alias = "trim_sx")]
    pub trim_left: f32,
    #[serde(alias = "trim_dx")]
    pub trim_right: f32,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            trim_left: 1.0,
            trim_right: 1.0,
        }
    }
}

impl MotorConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        info!(
            "Motor calibration loaded: trim_left={:.3} trim_right={:.3}",
            config.trim_left, config.trim_right
        );
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("trim_left", self.trim_left), ("trim_right", self.trim_right)] {
            if !(0.0..=MAX_TRIM).contains(&value) {
                return Err(ConfigError::TrimOutOfRange { name, value });
            }
        }
        Ok(())
    }
}
