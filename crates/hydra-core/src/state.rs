use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Position reported when the closure is fully open.
pub const FULLY_OPEN: u8 = 100;
/// Position reported when the closure is fully closed.
pub const FULLY_CLOSED: u8 = 0;

/// What the drive is currently doing between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrivingMode {
    #[default]
    None,
    /// Opening while the caller keeps refreshing the command.
    OpenHold,
    OpenToEnd,
    /// Closing while the caller keeps refreshing the command.
    CloseHold,
    CloseToEnd,
}

impl DrivingMode {
    pub fn is_hold(self) -> bool {
        matches!(self, Self::OpenHold | Self::CloseHold)
    }

    pub fn is_opening(self) -> bool {
        matches!(self, Self::OpenHold | Self::OpenToEnd)
    }

    pub fn is_closing(self) -> bool {
        matches!(self, Self::CloseHold | Self::CloseToEnd)
    }
}

/// Physical state of the simulated closure. Only the engine holds one.
#[derive(Debug, Clone)]
pub struct ActuatorState {
    pub position: u8,
    pub driving_mode: DrivingMode,
    pub last_command: Instant,
    pub simulated_error: Option<String>,
}

impl ActuatorState {
    pub fn new(position: u8, now: Instant) -> Self {
        Self {
            position: position.min(FULLY_OPEN),
            driving_mode: DrivingMode::None,
            last_command: now,
            simulated_error: None,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let status = if self.simulated_error.is_some() {
            Status::Error
        } else if self.driving_mode == DrivingMode::None {
            Status::Idle
        } else {
            Status::Driving
        };

        StatusSnapshot {
            status,
            error: self.simulated_error.clone(),
            position: Position::from_raw(self.position),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Idle,
    Driving,
    Error,
}

/// Coarse position as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Closed,
    Open,
    #[serde(rename = "inbetween")]
    InBetween,
}

impl Position {
    pub fn from_raw(position: u8) -> Self {
        match position {
            FULLY_CLOSED => Self::Closed,
            FULLY_OPEN => Self::Open,
            _ => Self::InBetween,
        }
    }
}

/// Point-in-time view of the closure handed out to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub position: Position,
}
