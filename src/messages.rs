// Message types shared by the robot server and the operator client

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Discrete motion the robot can be asked to perform.
///
/// On the wire actions are lowercase strings. The robot also accepts the
/// Italian names its first operator clients spoke (`avanti`, `indietro`,
/// `sinistra`, `destra`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[serde(alias = "avanti")]
    Forward,
    #[serde(alias = "indietro")]
    Backward,
    #[serde(alias = "sinistra")]
    Left,
    #[serde(alias = "destra")]
    Right,
    Stop,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Forward => "forward",
            Action::Backward => "backward",
            Action::Left => "left",
            Action::Right => "right",
            Action::Stop => "stop",
        }
    }

    /// Left/Right are the turn actions handled by micro-stepping
    pub fn is_turn(&self) -> bool {
        matches!(self, Action::Left | Action::Right)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" | "avanti" => Ok(Action::Forward),
            "backward" | "indietro" => Ok(Action::Backward),
            "left" | "sinistra" => Ok(Action::Left),
            "right" | "destra" => Ok(Action::Right),
            "stop" => Ok(Action::Stop),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// Command from operator -> robot, body of `POST /command`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub action: Action,
    pub speed: u8,
}

impl Command {
    pub fn new(action: Action, speed: u8) -> Self {
        Self { action, speed }
    }

    pub fn stop() -> Self {
        Self::new(Action::Stop, 0)
    }
}

/// `200` reply to an accepted command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    pub status: String,
    pub action: Action,
}

impl CommandAck {
    pub fn ok(action: Action) -> Self {
        Self {
            status: "ok".to_string(),
            action,
        }
    }
}

/// Body of every `4xx`/`5xx` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// `GET /ping`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingReply {
    pub status: String,
    pub simulated: bool,
    pub camera_available: bool,
}

/// `GET /stato`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReply {
    pub current_action: Action,
    pub simulated: bool,
}

/// `GET /stop`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopReply {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action_names() {
        assert_eq!("avanti".parse::<Action>(), Ok(Action::Forward));
        assert_eq!("FORWARD".parse::<Action>(), Ok(Action::Forward));
        assert_eq!(" Destra ".parse::<Action>(), Ok(Action::Right));
        assert_eq!("indietro".parse::<Action>(), Ok(Action::Backward));
        assert_eq!(
            "bogus".parse::<Action>(),
            Err(UnknownAction("bogus".to_string()))
        );
    }

    #[test]
    fn test_command_wire_format() {
        let json = serde_json::to_string(&Command::new(Action::Left, 60)).unwrap();
        assert_eq!(json, r#"{"action":"left","speed":60}"#);

        let cmd: Command = serde_json::from_str(r#"{"action":"sinistra","speed":60}"#).unwrap();
        assert_eq!(cmd, Command::new(Action::Left, 60));
    }

    #[test]
    fn test_replies_use_camel_case() {
        let ping = PingReply {
            status: "ok".into(),
            simulated: true,
            camera_available: false,
        };
        let value = serde_json::to_value(&ping).unwrap();
        assert_eq!(value["cameraAvailable"], false);

        let status = StatusReply {
            current_action: Action::Stop,
            simulated: true,
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["currentAction"], "stop");
    }
}
