use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::session::SlideshowSession;
use crate::config::SlideshowConfig;
use crate::db_types::SlideshowId;
use crate::submission_store::{StoreError, StoreResult, SubmissionStore};

/// A slideshow as rendered on one physical screen.
type DisplayKey = (SlideshowId, String);

/// Live playback sessions, one per slideshow and display. Screens showing
/// the same slideshow each advance through their own slots.
#[derive(Clone)]
pub struct SlideshowSessions {
    store: Arc<dyn SubmissionStore>,
    config: SlideshowConfig,
    sessions: Arc<Mutex<HashMap<DisplayKey, Arc<SlideshowSession>>>>,
}

impl SlideshowSessions {
    pub fn new(store: Arc<dyn SubmissionStore>, config: SlideshowConfig) -> Self {
        Self {
            store,
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DisplayKey, Arc<SlideshowSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: SlideshowId, display: &str) -> Option<Arc<SlideshowSession>> {
        self.lock().get(&(id, display.to_string())).cloned()
    }

    /// Returns the running session of `id` on `display`, creating it on
    /// first use.
    ///
    /// A new session bootstraps in the background and reports `Idle` until
    /// its first playlists are built.
    pub async fn get_or_start(
        &self,
        id: SlideshowId,
        display: &str,
    ) -> StoreResult<Arc<SlideshowSession>> {
        if let Some(session) = self.get(id, display) {
            return Ok(session);
        }

        let slideshow = self
            .store
            .load_slideshow(id)
            .await?
            .ok_or(StoreError::SlideshowNotFound(id))?;

        let session = {
            let mut sessions = self.lock();
            let key = (id, display.to_string());
            if let Some(existing) = sessions.get(&key) {
                return Ok(Arc::clone(existing));
            }
            let session =
                SlideshowSession::new(slideshow, display, Arc::clone(&self.store), &self.config);
            sessions.insert(key, Arc::clone(&session));
            session
        };

        info!(
            "Starting session for slideshow {} ({}) on display {}",
            id,
            session.slideshow().scope,
            display
        );
        session.spawn_start();

        Ok(session)
    }

    pub fn close(&self, id: SlideshowId, display: &str) -> bool {
        match self.lock().remove(&(id, display.to_string())) {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Closes sessions nobody polled for longer than `max_idle`.
    pub fn reap_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|(id, display), session| {
            if session.idle_for() <= max_idle {
                return true;
            }
            info!("Closing idle session for slideshow {} on {}", id, display);
            session.close();
            false
        });
        before - sessions.len()
    }

    /// Closes every session and returns them, their background work may
    /// still be running.
    pub fn close_all(&self) -> Vec<Arc<SlideshowSession>> {
        let drained: Vec<_> = self.lock().drain().map(|(_, session)| session).collect();
        for session in &drained {
            session.close();
        }
        drained
    }

    /// Closes every session and waits up to `grace` for their rebuilds and
    /// play recordings to finish. Returns false if some were still running.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let closed = self.close_all();
        let drain = async {
            for session in &closed {
                session.wait_for_background().await;
            }
        };

        match tokio::time::timeout(grace, drain).await {
            Ok(()) => true,
            Err(_) => {
                let pending: usize = closed.iter().map(|s| s.background_tasks()).sum();
                warn!(
                    "Gave up waiting for {} background tasks after {:?}",
                    pending, grace
                );
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
