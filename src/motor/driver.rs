// Actuator for the AlphaBot base
//
// `MotorDrive` is the seam to the pin-level motor bridge. `Actuator` sits on
// top of it and turns validated actions into wheel duties.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use super::kinematics::{ActionMap, WheelDuties, action_to_duties};
use crate::config::MotorConfig;
use crate::messages::Action;

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("Motor bridge unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Motor-drive primitive: set both wheels at once, or cut power
pub trait MotorDrive: Send {
    fn set_duties(&mut self, duties: WheelDuties) -> Result<(), DriveError>;

    fn stop(&mut self) -> Result<(), DriveError> {
        self.set_duties(WheelDuties::zero())
    }

    /// True if no physical motors are attached
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Motor drive used off the robot: logs and records every write.
///
/// Clones share the same history, so a test can keep one handle and give
/// the other to the actuator.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDrive {
    history: Arc<Mutex<Vec<WheelDuties>>>,
}

impl SimulatedDrive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every duty pair written so far, oldest first
    pub fn history(&self) -> Vec<WheelDuties> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<WheelDuties> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
    }

    /// Number of writes that cut power to both wheels
    pub fn stop_count(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|d| d.is_zero())
            .count()
    }
}

impl MotorDrive for SimulatedDrive {
    fn set_duties(&mut self, duties: WheelDuties) -> Result<(), DriveError> {
        debug!(
            "[sim] wheel duties: left={}%, right={}%",
            duties.left, duties.right
        );
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duties);
        Ok(())
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Robot base: motor drive plus the action table and calibration
pub struct Actuator {
    drive: Box<dyn MotorDrive>,
    map: ActionMap,
    motor: MotorConfig,
    current: Action,
}

impl Actuator {
    pub fn new(drive: Box<dyn MotorDrive>, map: ActionMap, motor: MotorConfig) -> Self {
        Self {
            drive,
            map,
            motor,
            current: Action::Stop,
        }
    }

    /// Drive the base for `action` at `speed`
    pub fn apply(&mut self, action: Action, speed: u8) -> Result<(), DriveError> {
        let duties = action_to_duties(action, speed, &self.map, &self.motor);
        if duties.is_zero() {
            self.drive.stop()?;
        } else {
            self.drive.set_duties(duties)?;
        }
        self.current = action;
        Ok(())
    }

    /// Stop both wheels
    pub fn stop(&mut self) -> Result<(), DriveError> {
        // Record Stop even if the bridge write fails: nothing will drive the
        // wheels again until the next accepted command
        self.current = Action::Stop;
        self.drive.stop()
    }

    pub fn current_action(&self) -> Action {
        self.current
    }

    pub fn is_simulated(&self) -> bool {
        self.drive.is_simulated()
    }
}

impl Drop for Actuator {
    fn drop(&mut self) {
        info!("Releasing motors");
        if let Err(e) = self.stop() {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_records_duties_and_action() {
        let sim = SimulatedDrive::new();
        let mut actuator = Actuator::new(
            Box::new(sim.clone()),
            ActionMap::nominal(),
            MotorConfig::default(),
        );

        actuator.apply(Action::Forward, 255).unwrap();
        assert_eq!(actuator.current_action(), Action::Forward);
        assert_eq!(sim.last(), Some(WheelDuties::new(100, 100)));

        actuator.stop().unwrap();
        assert_eq!(actuator.current_action(), Action::Stop);
        assert_eq!(sim.stop_count(), 1);
    }

    #[test]
    fn test_drop_stops_motors() {
        let sim = SimulatedDrive::new();
        {
            let mut actuator =
                Actuator::new(Box::new(sim.clone()), ActionMap::default(), MotorConfig::default());
            actuator.apply(Action::Right, 160).unwrap();
        }
        assert_eq!(sim.last(), Some(WheelDuties::zero()));
    }
}
