//! Events emitted toward UI collaborators, and cancellation plumbing.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// Everything the engine reports while installing or running a version.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Progress {
        id: String,
        fraction: f64,
        bytes_done: u64,
        bytes_total: u64,
    },
    Stdio {
        id: String,
        line: String,
    },
    Started {
        id: String,
        pid: u32,
    },
    Exited {
        id: String,
        code: Option<i32>,
    },
    Error {
        id: String,
        kind: String,
        detail: String,
    },
}

/// Callback receiving engine events. The engine invokes it from worker
/// tasks; implementations marshal to their own thread as needed.
pub type EventSink = Arc<dyn Fn(EngineEvent) + Send + Sync + 'static>;

/// A sink that drops everything. Useful for tests and fire-and-forget
/// installs.
pub fn null_sink() -> EventSink {
    Arc::new(|_| {})
}

/// Cancels an in-flight install.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observed by install workers; cheap to clone and poll.
#[derive(Clone)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// A token that can never fire. For callers that don't cancel.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }
}

/// Create a linked cancel handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (
        CancelHandle { tx: Arc::new(tx) },
        CancelToken { rx: Some(rx) },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_propagates() {
        let (handle, token) = cancel_pair();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());

        let clone = token.clone();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn never_token_stays_quiet() {
        assert!(!CancelToken::never().is_cancelled());
    }

    #[test]
    fn events_serialize_with_tags() {
        let event = EngineEvent::Progress {
            id: "1.20.4".to_string(),
            fraction: 0.5,
            bytes_done: 50,
            bytes_total: 100,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"progress""#));
    }
}
