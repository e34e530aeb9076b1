// Differential-drive mapping for the AlphaBot 2-wheel base
// Converts a discrete action plus 0..=255 speed into signed per-wheel duty cycles.

use crate::config::MotorConfig;
use crate::messages::Action;

/// Maximum duty cycle in percent
pub const MAX_DUTY: i8 = 100;

/// Drive direction of one wheel, as seen by the H-bridge inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// IN1 high, IN2 low
    Positive,
    /// IN1 low, IN2 high
    Negative,
    Off,
}

impl Polarity {
    fn sign(self) -> i16 {
        match self {
            Polarity::Positive => 1,
            Polarity::Negative => -1,
            Polarity::Off => 0,
        }
    }
}

/// Signed duty cycles in percent (-100..=100), positive = Polarity::Positive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WheelDuties {
    pub left: i8,
    pub right: i8,
}

impl WheelDuties {
    pub fn new(left: i8, right: i8) -> Self {
        Self { left, right }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.left == 0 && self.right == 0
    }
}

/// Action -> (left, right) polarity table.
///
/// The AlphaBot as wired has both motors mounted mirrored and the bridge
/// outputs swapped, so "forward" is not (+, +). The table is data rather
/// than code so a differently wired robot only needs a different table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionMap {
    forward: (Polarity, Polarity),
    backward: (Polarity, Polarity),
    left: (Polarity, Polarity),
    right: (Polarity, Polarity),
}

impl ActionMap {
    /// Table matching the robot's actual wiring
    pub fn as_wired() -> Self {
        use Polarity::*;
        Self {
            forward: (Positive, Negative),
            backward: (Negative, Positive),
            left: (Negative, Negative),
            right: (Positive, Positive),
        }
    }

    /// Textbook differential drive: both wheels positive = forward
    pub fn nominal() -> Self {
        use Polarity::*;
        Self {
            forward: (Positive, Positive),
            backward: (Negative, Negative),
            left: (Negative, Positive),
            right: (Positive, Negative),
        }
    }

    pub fn polarities(&self, action: Action) -> (Polarity, Polarity) {
        match action {
            Action::Forward => self.forward,
            Action::Backward => self.backward,
            Action::Left => self.left,
            Action::Right => self.right,
            Action::Stop => (Polarity::Off, Polarity::Off),
        }
    }
}

impl Default for ActionMap {
    fn default() -> Self {
        Self::as_wired()
    }
}

/// Convert a 0..=255 speed to a duty cycle percentage
pub fn speed_to_duty(speed: u8) -> i16 {
    (speed as i16 * MAX_DUTY as i16 / 255).min(MAX_DUTY as i16)
}

fn trimmed(duty: i16, trim: f32) -> i16 {
    ((duty as f32 * trim) as i16).min(MAX_DUTY as i16)
}

/// Compute wheel duties for an action using the given table and calibration
pub fn action_to_duties(
    action: Action,
    speed: u8,
    map: &ActionMap,
    motor: &MotorConfig,
) -> WheelDuties {
    let (left, right) = map.polarities(action);
    let duty = speed_to_duty(speed);

    WheelDuties {
        left: (left.sign() * trimmed(duty, motor.trim_left)) as i8,
        right: (right.sign() * trimmed(duty, motor.trim_right)) as i8,
    }
}
