use crate::state::StatusSnapshot;
use chrono::{DateTime, FixedOffset};
use thiserror::Error;

/// Timestamp supplied by the caller alongside a driving command.
pub type ClientTime = DateTime<FixedOffset>;

/// Failures an actuator backend may report for a command.
///
/// The simulated closure never produces one; a hardware backend would.
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("actuator unavailable: {0}")]
    Unavailable(String),
}

/// Command surface of a motorized closure.
///
/// Every call is serialized against the drive and returns a fresh snapshot,
/// never a reference into the live state.
pub trait ClosureActuator: Send + Sync {
    fn status(&self) -> Result<StatusSnapshot, ActuatorError>;

    /// Drive open for as long as the caller keeps repeating the command.
    fn open(&self, client_time: ClientTime) -> Result<StatusSnapshot, ActuatorError>;

    /// Drive closed for as long as the caller keeps repeating the command.
    fn close(&self, client_time: ClientTime) -> Result<StatusSnapshot, ActuatorError>;

    fn open_to_end(&self, client_time: ClientTime) -> Result<StatusSnapshot, ActuatorError>;

    fn close_to_end(&self, client_time: ClientTime) -> Result<StatusSnapshot, ActuatorError>;

    fn stop(&self, client_time: ClientTime) -> Result<StatusSnapshot, ActuatorError>;

    /// Inject or clear a fault. Injecting halts the drive.
    fn set_simulated_error(&self, active: bool);
}
