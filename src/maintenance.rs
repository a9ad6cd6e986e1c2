use clokwerk::{Job, Scheduler, TimeUnits};
use log::{error, info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Mutex;

use crate::db_pool::{vacuum_database, DbPool};
use crate::slideshow::SlideshowSessions;

/// Periodic housekeeping that runs beside the HTTP server: reaps sessions
/// whose display went away and compacts the database once a day.
#[derive(Clone)]
pub struct MaintenanceScheduler {
    db_pool: DbPool,
    sessions: SlideshowSessions,
    session_idle: Duration,
    vacuum_lock: Arc<Mutex<()>>,
}

impl MaintenanceScheduler {
    pub fn new(db_pool: DbPool, sessions: SlideshowSessions, session_idle: Duration) -> Self {
        Self {
            db_pool,
            sessions,
            session_idle,
            vacuum_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Starts the scheduler thread. Must be called from within a tokio runtime.
    pub fn start(&self) -> JoinHandle<()> {
        let mut scheduler = Scheduler::new();
        let runtime = Handle::current();

        let reaper = self.clone();
        scheduler.every(5.minutes()).run(move || {
            reaper.reap_idle_sessions();
        });

        let vacuum = self.clone();
        scheduler.every(1.day()).at("03:00").run(move || {
            runtime.block_on(vacuum.run_vacuum());
        });

        let handle = thread::spawn(move || loop {
            scheduler.run_pending();
            thread::sleep(Duration::from_secs(30));
        });

        info!(
            "Maintenance scheduler started (idle sessions closed after {:?})",
            self.session_idle
        );
        handle
    }

    pub fn reap_idle_sessions(&self) -> usize {
        let reaped = self.sessions.reap_idle(self.session_idle);
        if reaped > 0 {
            info!("Closed {} idle slideshow sessions", reaped);
        }
        reaped
    }

    /// Returns false when skipped because another VACUUM holds the lock.
    pub async fn run_vacuum(&self) -> bool {
        let _lock = match self.vacuum_lock.try_lock() {
            Ok(lock) => lock,
            Err(_) => {
                warn!("Skipping scheduled VACUUM - another one is still running");
                return false;
            }
        };

        info!("Running scheduled database VACUUM");
        if let Err(e) = vacuum_database(&self.db_pool).await {
            error!("Database VACUUM failed: {}", e);
        }
        true
    }
}
