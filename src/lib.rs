pub mod camera;
pub mod channel;
pub mod config;
pub mod executor;
pub mod messages;
pub mod motor;
pub mod operator;
pub mod runtime;
pub mod stepper;
pub mod stream;
pub mod watchdog;
