pub mod actuator;
pub mod sim;
pub mod state;
pub mod ticker;
pub mod timebase;

pub use actuator::{ActuatorError, ClientTime, ClosureActuator};
pub use sim::{SimConfig, SimulatedClosure, TickOutcome};
pub use state::{Position, Status, StatusSnapshot};
pub use ticker::{spawn_ticker, TickCounters, TickStats, TickerHandle};
pub use timebase::TimeBase;
