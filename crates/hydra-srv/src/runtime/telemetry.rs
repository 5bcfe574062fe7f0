use hydra_core::{ClosureActuator, Position, Status, TickCounters, TickStats};
use hydra_io::metrics::{
    init_metrics, serve_metrics, ACTUATOR_POSITION, ACTUATOR_STATUS, END_STOPS, HOLD_EXPIRIES,
    POSITION_STEPS, TICKS_EXECUTED, TICKS_MISSED,
};
use std::sync::{atomic::AtomicBool, Arc};
use std::thread;
use std::time::Duration;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

/// Copy tick counters and the actuator snapshot into the registry.
pub fn start_metrics_updater(
    actuator: Arc<dyn ClosureActuator>,
    counters: Arc<TickCounters>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut last = TickStats::default();
        while !stop.load(std::sync::atomic::Ordering::Relaxed) {
            let stats = counters.snapshot();
            TICKS_EXECUTED.inc_by(stats.ticks_executed - last.ticks_executed);
            TICKS_MISSED.inc_by(stats.ticks_missed - last.ticks_missed);
            POSITION_STEPS.inc_by(stats.steps - last.steps);
            END_STOPS.inc_by(stats.end_stops - last.end_stops);
            HOLD_EXPIRIES.inc_by(stats.hold_expiries - last.hold_expiries);
            last = stats;

            if let Ok(snapshot) = actuator.status() {
                ACTUATOR_POSITION.set(match snapshot.position {
                    Position::Closed => 0.0,
                    Position::InBetween => 1.0,
                    Position::Open => 2.0,
                });
                ACTUATOR_STATUS.set(match snapshot.status {
                    Status::Idle => 0.0,
                    Status::Driving => 1.0,
                    Status::Error => 2.0,
                });
            }

            thread::sleep(Duration::from_millis(200));
        }
    })
}
