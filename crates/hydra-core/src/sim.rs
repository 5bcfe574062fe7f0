use crate::actuator::{ActuatorError, ClientTime, ClosureActuator};
use crate::state::{ActuatorState, DrivingMode, StatusSnapshot, FULLY_CLOSED, FULLY_OPEN};
use crate::timebase::TimeBase;
use log::{debug, info};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct SimConfig {
    /// Interval between two ticks of the background worker.
    pub tick_period: Duration,
    /// How long a hold command keeps driving without being repeated.
    pub hold_timeout: Duration,
    pub error_message: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(500),
            hold_timeout: Duration::from_millis(1500),
            error_message: "Oh nein, ein Fehler!".to_string(),
        }
    }
}

/// What a single tick did to the drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Stepped,
    /// Reached the end stop and went idle.
    ReachedEnd,
    /// A hold command was not refreshed in time and went idle.
    HoldExpired,
}

/// Simulated gate drive. Moves one unit per tick toward the commanded end.
#[derive(Debug)]
pub struct SimulatedClosure {
    state: Mutex<ActuatorState>,
    tick_period: Duration,
    hold_timeout: Duration,
    error_message: String,
    timebase: TimeBase,
}

impl SimulatedClosure {
    /// Starts fully closed.
    pub fn new(config: &SimConfig) -> Self {
        Self::with_position(config, FULLY_CLOSED)
    }

    pub fn with_position(config: &SimConfig, position: u8) -> Self {
        Self {
            state: Mutex::new(ActuatorState::new(position, Instant::now())),
            tick_period: config.tick_period,
            hold_timeout: config.hold_timeout,
            error_message: config.error_message.clone(),
            timebase: TimeBase::new(),
        }
    }

    // No mutation can panic halfway, so a poisoned state is still consistent.
    fn lock(&self) -> MutexGuard<'_, ActuatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    pub fn tick(&self) -> TickOutcome {
        self.tick_at(Instant::now())
    }

    /// Advance the drive by one step as of `now`.
    pub fn tick_at(&self, now: Instant) -> TickOutcome {
        let mut state = self.lock();
        let mode = state.driving_mode;

        if mode.is_hold() && now.saturating_duration_since(state.last_command) > self.hold_timeout
        {
            state.driving_mode = DrivingMode::None;
            return TickOutcome::HoldExpired;
        }

        if mode.is_opening() {
            if state.position == FULLY_OPEN {
                state.driving_mode = DrivingMode::None;
                return TickOutcome::ReachedEnd;
            }
            state.position += 1;
            TickOutcome::Stepped
        } else if mode.is_closing() {
            if state.position == FULLY_CLOSED {
                state.driving_mode = DrivingMode::None;
                return TickOutcome::ReachedEnd;
            }
            state.position -= 1;
            TickOutcome::Stepped
        } else {
            TickOutcome::Idle
        }
    }

    fn drive(
        &self,
        mode: DrivingMode,
        client_time: ClientTime,
    ) -> Result<StatusSnapshot, ActuatorError> {
        let mut state = self.lock();

        let at_end = (mode.is_opening() && state.position == FULLY_OPEN)
            || (mode.is_closing() && state.position == FULLY_CLOSED);
        if at_end {
            debug!("{:?} ignored, already at end stop", mode);
            return Ok(state.snapshot());
        }

        debug!(
            "{:?} from position {} (client skew {} ms)",
            mode,
            state.position,
            self.timebase.skew_ms(&client_time)
        );
        state.last_command = Instant::now();
        state.driving_mode = mode;

        Ok(state.snapshot())
    }

    #[cfg(test)]
    pub(crate) fn raw(&self) -> ActuatorState {
        self.lock().clone()
    }
}

impl ClosureActuator for SimulatedClosure {
    fn status(&self) -> Result<StatusSnapshot, ActuatorError> {
        Ok(self.lock().snapshot())
    }

    fn open(&self, client_time: ClientTime) -> Result<StatusSnapshot, ActuatorError> {
        self.drive(DrivingMode::OpenHold, client_time)
    }

    fn close(&self, client_time: ClientTime) -> Result<StatusSnapshot, ActuatorError> {
        self.drive(DrivingMode::CloseHold, client_time)
    }

    fn open_to_end(&self, client_time: ClientTime) -> Result<StatusSnapshot, ActuatorError> {
        self.drive(DrivingMode::OpenToEnd, client_time)
    }

    fn close_to_end(&self, client_time: ClientTime) -> Result<StatusSnapshot, ActuatorError> {
        self.drive(DrivingMode::CloseToEnd, client_time)
    }

    fn stop(&self, client_time: ClientTime) -> Result<StatusSnapshot, ActuatorError> {
        let mut state = self.lock();
        debug!(
            "Stop at position {} (client skew {} ms)",
            state.position,
            self.timebase.skew_ms(&client_time)
        );
        state.last_command = Instant::now();
        state.driving_mode = DrivingMode::None;
        Ok(state.snapshot())
    }

    fn set_simulated_error(&self, active: bool) {
        let mut state = self.lock();
        if active {
            state.driving_mode = DrivingMode::None;
            state.simulated_error = Some(self.error_message.clone());
            info!("Simulated error injected at position {}", state.position);
        } else {
            state.simulated_error = None;
            info!("Simulated error cleared");
        }
    }
}
