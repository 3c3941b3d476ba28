//! Owns every running session and the cancellation tree above them.

use super::flight::FlightPoller;
use super::session::SessionHandle;
use super::spot::SpotPricePoller;
use super::PollError;
use crate::domain::{CurrencyPair, IdentType};
use futures::future::join_all;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

struct Tracked {
    cancel: CancellationToken,
    handle: SessionHandle,
}

/// Starts sessions, cancels them individually or together, and collects
/// their outcomes.
pub struct Coordinator {
    root: CancellationToken,
    sessions: HashMap<String, Tracked>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Parent every session under `root`, e.g. a process-wide shutdown token.
    pub fn with_token(root: CancellationToken) -> Self {
        Self {
            root,
            sessions: HashMap::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Finished sessions stay tracked so their outcome reaches
    /// [`join_all`](Self::join_all); an entity is started at most once.
    fn ensure_untracked(&self, entity: &str) -> Result<(), PollError> {
        if self.sessions.contains_key(entity) {
            return Err(PollError::AlreadyTracked(entity.to_string()));
        }
        Ok(())
    }

    /// Resolve and start polling a flight. Bootstrap errors are returned here.
    pub async fn start_flight(
        &mut self,
        poller: &FlightPoller,
        ident: &str,
        ident_type: IdentType,
    ) -> Result<String, PollError> {
        let entity = format!("flight:{}", ident);
        self.ensure_untracked(&entity)?;
        let cancel = self.root.child_token();
        let handle = poller.spawn(ident, ident_type, cancel.clone()).await?;
        self.sessions.insert(entity.clone(), Tracked { cancel, handle });
        Ok(entity)
    }

    pub fn start_spot(
        &mut self,
        poller: &SpotPricePoller,
        pair: CurrencyPair,
    ) -> Result<String, PollError> {
        let entity = format!("spot:{}", pair.entity_key());
        self.ensure_untracked(&entity)?;
        let cancel = self.root.child_token();
        let handle = poller.spawn(pair, cancel.clone());
        self.sessions.insert(entity.clone(), Tracked { cancel, handle });
        Ok(entity)
    }

    /// Cancel one session. Its outcome is still collected by [`join_all`](Self::join_all).
    pub fn stop(&self, entity: &str) -> bool {
        match self.sessions.get(entity) {
            Some(tracked) => {
                tracked.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn shutdown(&self) {
        tracing::info!(sessions = self.sessions.len(), "shutting down poll sessions");
        self.root.cancel();
    }

    /// True while the entity's session task has not exited.
    pub fn is_running(&self, entity: &str) -> bool {
        self.sessions
            .get(entity)
            .map_or(false, |tracked| !tracked.handle.is_finished())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(|k| k.as_str())
    }

    /// Wait for every session to report and return the ones that failed.
    pub async fn join_all(self) -> Vec<(String, PollError)> {
        let waits = self.sessions.into_iter().map(|(entity, tracked)| async move {
            (entity, tracked.handle.wait().await)
        });
        join_all(waits)
            .await
            .into_iter()
            .filter_map(|(entity, outcome)| outcome.err().map(|e| (entity, e)))
            .collect()
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
