// Motor control module for the AlphaBot base
//
// Provides:
// - Action -> wheel duty mapping (kinematics)
// - The motor-drive seam plus a simulated drive and the Actuator (driver)

pub mod driver;
pub mod kinematics;

pub use driver::{Actuator, DriveError, MotorDrive, SimulatedDrive};
pub use kinematics::{ActionMap, Polarity, WheelDuties};
