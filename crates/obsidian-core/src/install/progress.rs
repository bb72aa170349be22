//! Byte-level progress accounting for an install run.

use crate::events::{EngineEvent, EventSink};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const EMIT_INTERVAL: Duration = Duration::from_millis(100);

/// Thread-safe accumulator of bytes done against bytes expected.
///
/// Emissions are debounced to one per 100 ms; the fraction is clamped to
/// `[0, 1]` and `bytes_done` never decreases.
pub struct ProgressAggregator {
    id: String,
    sink: EventSink,
    state: Mutex<State>,
}

struct State {
    done: u64,
    total: u64,
    last_emit: Option<Instant>,
}

impl ProgressAggregator {
    pub fn new(id: impl Into<String>, sink: EventSink) -> Self {
        Self {
            id: id.into(),
            sink,
            state: Mutex::new(State {
                done: 0,
                total: 0,
                last_emit: None,
            }),
        }
    }

    /// Grow the expected byte count (planned tasks, late asset expansion).
    pub fn add_total(&self, bytes: u64) {
        let mut state = self.state.lock().unwrap();
        state.total += bytes;
    }

    /// Record completed bytes and maybe emit a debounced event.
    pub fn add(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        let mut state = self.state.lock().unwrap();
        state.done += bytes;

        let due = state
            .last_emit
            .map(|at| at.elapsed() >= EMIT_INTERVAL)
            .unwrap_or(true);
        if due {
            state.last_emit = Some(Instant::now());
            let event = event_for(&self.id, &state);
            drop(state);
            (self.sink)(event);
        }
    }

    /// Unconditional final emission. Called exactly once when the run ends.
    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap();
        state.last_emit = Some(Instant::now());
        let event = event_for(&self.id, &state);
        drop(state);
        (self.sink)(event);
    }

    pub fn bytes_done(&self) -> u64 {
        self.state.lock().unwrap().done
    }

    pub fn bytes_total(&self) -> u64 {
        self.state.lock().unwrap().total
    }
}

fn event_for(id: &str, state: &State) -> EngineEvent {
    let fraction = if state.total == 0 {
        1.0
    } else {
        (state.done as f64 / state.total as f64).clamp(0.0, 1.0)
    };
    EngineEvent::Progress {
        id: id.to_string(),
        fraction,
        bytes_done: state.done,
        bytes_total: state.total,
    }
}
