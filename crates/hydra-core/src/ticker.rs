use crate::sim::{SimulatedClosure, TickOutcome};
use log::{debug, warn};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct TickStats {
    pub ticks_executed: u64,
    pub ticks_missed: u64,
    pub steps: u64,
    pub end_stops: u64,
    pub hold_expiries: u64,
}

/// Counters shared between the tick worker and whoever reports on it.
#[derive(Debug, Default)]
pub struct TickCounters {
    ticks_executed: AtomicU64,
    ticks_missed: AtomicU64,
    steps: AtomicU64,
    end_stops: AtomicU64,
    hold_expiries: AtomicU64,
}

impl TickCounters {
    fn record(&self, outcome: TickOutcome) {
        self.ticks_executed.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            TickOutcome::Idle => return,
            TickOutcome::Stepped => &self.steps,
            TickOutcome::ReachedEnd => &self.end_stops,
            TickOutcome::HoldExpired => &self.hold_expiries,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TickStats {
        TickStats {
            ticks_executed: self.ticks_executed.load(Ordering::Relaxed),
            ticks_missed: self.ticks_missed.load(Ordering::Relaxed),
            steps: self.steps.load(Ordering::Relaxed),
            end_stops: self.end_stops.load(Ordering::Relaxed),
            hold_expiries: self.hold_expiries.load(Ordering::Relaxed),
        }
    }
}

/// Handle to the background tick worker.
pub struct TickerHandle {
    stop: Arc<AtomicBool>,
    counters: Arc<TickCounters>,
    thread: JoinHandle<()>,
}

impl TickerHandle {
    pub fn counters(&self) -> Arc<TickCounters> {
        Arc::clone(&self.counters)
    }

    /// Stop the worker, wait for it to exit and return the final counters.
    pub fn shutdown(self) -> TickStats {
        self.stop.store(true, Ordering::Release);
        self.thread.thread().unpark();
        if self.thread.join().is_err() {
            warn!("Tick worker panicked");
        }
        self.counters.snapshot()
    }
}

/// Spawn the worker that advances `sim` once every tick period.
pub fn spawn_ticker(sim: Arc<SimulatedClosure>) -> io::Result<TickerHandle> {
    let period = sim.tick_period();
    let stop = Arc::new(AtomicBool::new(false));
    let counters = Arc::new(TickCounters::default());

    let stop_worker = Arc::clone(&stop);
    let counters_worker = Arc::clone(&counters);
    let thread = thread::Builder::new()
        .name("hydra-tick".to_string())
        .spawn(move || run(&sim, period, &stop_worker, &counters_worker))?;

    Ok(TickerHandle {
        stop,
        counters,
        thread,
    })
}

fn run(sim: &SimulatedClosure, period: Duration, stop: &AtomicBool, counters: &TickCounters) {
    debug!("Tick worker started (period {:?})", period);
    let mut next_tick = Instant::now() + period;

    loop {
        // Park until the deadline; shutdown unparks us early.
        loop {
            if stop.load(Ordering::Acquire) {
                debug!("Tick worker stopped");
                return;
            }
            let now = Instant::now();
            if now >= next_tick {
                break;
            }
            thread::park_timeout(next_tick - now);
        }

        let outcome = sim.tick();
        counters.record(outcome);
        if outcome == TickOutcome::HoldExpired {
            debug!("Hold command expired");
        }

        next_tick += period;
        let now = Instant::now();
        if next_tick < now {
            counters.ticks_missed.fetch_add(1, Ordering::Relaxed);
            next_tick = now + period;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::ClosureActuator;
    use crate::sim::SimConfig;
    use crate::state::{Position, Status};
    use chrono::Utc;

    fn sim_ticking_every(period: Duration) -> Arc<SimulatedClosure> {
        let config = SimConfig {
            tick_period: period,
            ..SimConfig::default()
        };
        Arc::new(SimulatedClosure::new(&config))
    }

    fn fast_sim() -> Arc<SimulatedClosure> {
        sim_ticking_every(Duration::from_millis(1))
    }

    #[test]
    fn test_worker_drives_to_end() {
        let sim = fast_sim();
        let handle = spawn_ticker(Arc::clone(&sim)).unwrap();

        sim.open_to_end(Utc::now().fixed_offset()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while sim.status().unwrap().status == Status::Driving && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let snapshot = sim.status().unwrap();
        assert_eq!(snapshot.status, Status::Idle);
        assert_eq!(snapshot.position, Position::Open);

        let stats = handle.shutdown();
        assert_eq!(stats.steps, 100);
        assert_eq!(stats.end_stops, 1);
        assert!(stats.ticks_executed >= 101);
    }

    #[test]
    fn test_shutdown_is_prompt_with_long_period() {
        let sim = sim_ticking_every(Duration::from_secs(3600));
        let handle = spawn_ticker(sim).unwrap();

        let started = Instant::now();
        let stats = handle.shutdown();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(stats.ticks_executed, 0);
    }

    #[test]
    fn test_counters_visible_while_running() {
        let sim = fast_sim();
        let handle = spawn_ticker(sim).unwrap();
        let counters = handle.counters();

        let deadline = Instant::now() + Duration::from_secs(5);
        while counters.snapshot().ticks_executed < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(counters.snapshot().ticks_executed >= 3);
        handle.shutdown();
    }
}
