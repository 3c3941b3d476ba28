//! Per-entity session plumbing: state tracking and the one-shot outcome channel.

use super::PollError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Starting,
    CheckingCache,
    Fetching,
    Deciding,
    Notifying,
    Waiting,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Starting => "starting",
            SessionState::CheckingCache => "checking-cache",
            SessionState::Fetching => "fetching",
            SessionState::Deciding => "deciding",
            SessionState::Notifying => "notifying",
            SessionState::Waiting => "waiting",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Handle a running loop uses to publish its state.
#[derive(Clone)]
pub struct SessionTracker {
    id: Uuid,
    entity: Arc<str>,
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionTracker {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn transition(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(
                session = %self.id,
                entity = %self.entity,
                from = %previous,
                to = %next,
                "session transition"
            );
        }
    }
}

/// Owner's view of a spawned session.
#[derive(Debug)]
pub struct SessionHandle {
    id: Uuid,
    entity: String,
    state: watch::Receiver<SessionState>,
    outcome: oneshot::Receiver<Result<(), PollError>>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Block until the session reports its single terminal outcome.
    pub async fn wait(self) -> Result<(), PollError> {
        match self.outcome.await {
            Ok(outcome) => outcome,
            Err(_) => match self.task.await {
                Err(e) if e.is_panic() => Err(PollError::Aborted("session task panicked".to_string())),
                _ => Err(PollError::Aborted(
                    "session ended without reporting an outcome".to_string(),
                )),
            },
        }
    }
}

/// Spawn `body` as a session task. The task reports its result exactly once
/// and always finishes in [`SessionState::Terminated`].
pub fn spawn_session<F, Fut>(entity: impl Into<String>, body: F) -> SessionHandle
where
    F: FnOnce(SessionTracker) -> Fut,
    Fut: Future<Output = Result<(), PollError>> + Send + 'static,
{
    let entity = entity.into();
    let id = Uuid::new_v4();
    let (state_tx, state_rx) = watch::channel(SessionState::Starting);
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let tracker = SessionTracker {
        id,
        entity: Arc::from(entity.as_str()),
        state: Arc::new(state_tx),
    };

    let fut = body(tracker.clone());
    let task = tokio::spawn(async move {
        let outcome = fut.await;
        tracker.transition(SessionState::Terminated);
        match &outcome {
            Ok(()) => tracing::info!(session = %tracker.id(), entity = %tracker.entity(), "session finished"),
            Err(e) => tracing::error!(session = %tracker.id(), entity = %tracker.entity(), error = %e, "session failed"),
        }
        // The owner may have dropped its handle.
        let _ = outcome_tx.send(outcome);
    });

    SessionHandle {
        id,
        entity,
        state: state_rx,
        outcome: outcome_rx,
        task,
    }
}
