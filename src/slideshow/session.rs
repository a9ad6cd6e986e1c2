//! Three-slot playback scheduler for one public display.
//!
//! Slots A, B and C each hold one playlist generation. One slot plays while
//! the slot that finished last is refilled in the background, excluding
//! everything resident in the other two. `current_slide` and `advance` only
//! touch in-memory state; store I/O always happens on spawned tasks.

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};

use super::playlist::{Playlist, PlaylistBuilder, Slide};
use super::Classifier;
use crate::config::SlideshowConfig;
use crate::db_types::{Slideshow, SlideshowId, SubmissionId};
use crate::submission_store::{StoreError, SubmissionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SlotId {
    A,
    B,
    C,
}

impl SlotId {
    pub const ALL: [SlotId; 3] = [SlotId::A, SlotId::B, SlotId::C];

    fn index(self) -> usize {
        match self {
            SlotId::A => 0,
            SlotId::B => 1,
            SlotId::C => 2,
        }
    }

    pub fn next(self) -> SlotId {
        match self {
            SlotId::A => SlotId::B,
            SlotId::B => SlotId::C,
            SlotId::C => SlotId::A,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotId::A => "A",
            SlotId::B => "B",
            SlotId::C => "C",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No playlist built yet.
    Idle,
    Playing,
    /// Playing while at least one slot is being refilled.
    Rebuilding,
    /// Every slot is empty; a retry loop re-runs the bootstrap.
    Exhausted,
}

#[derive(Debug, thiserror::Error)]
pub enum RebuildError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("store query timed out after {0:?}")]
    Timeout(Duration),
}

/// Settings of one session, resolved from global defaults and the slideshow row.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub display_duration_ms: u64,
    pub target_slides: Option<usize>,
    pub candidate_limit: Option<u32>,
    pub square_tolerance: f64,
    pub rebuild_timeout: Duration,
    pub retry_interval: Duration,
}

impl SessionSettings {
    pub fn resolve(config: &SlideshowConfig, slideshow: &Slideshow) -> Self {
        Self {
            display_duration_ms: slideshow
                .display_duration_ms
                .unwrap_or(config.display_duration_ms),
            target_slides: slideshow
                .target_slides
                .or(config.target_slides)
                .filter(|n| *n > 0),
            candidate_limit: config.candidate_limit,
            square_tolerance: config.square_tolerance,
            rebuild_timeout: config.rebuild_timeout,
            retry_interval: config.retry_interval,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotStatus {
    pub slot: SlotId,
    pub slides: usize,
    pub submissions: usize,
    pub rebuilding: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub slideshow_id: SlideshowId,
    pub display_id: String,
    pub state: PlaybackState,
    pub active_slot: Option<SlotId>,
    pub position: usize,
    pub display_duration_ms: u64,
    pub slots: Vec<SlotStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Playing,
    Exhausted,
}

#[derive(Debug, Default)]
struct Slot {
    playlist: Playlist,
    rebuilding: bool,
    // Bumped on every swap; a rebuild whose generation is outdated is dropped.
    generation: u64,
}

struct SessionState {
    slots: [Slot; 3],
    active: SlotId,
    position: usize,
    phase: Phase,
    bootstrapping: bool,
    retrying: bool,
    closed: bool,
    last_polled: Instant,
}

impl SessionState {
    fn slot(&self, id: SlotId) -> &Slot {
        &self.slots[id.index()]
    }

    fn slot_mut(&mut self, id: SlotId) -> &mut Slot {
        &mut self.slots[id.index()]
    }

    /// Submission ids resident in every slot except `slot`.
    fn ids_outside(&self, slot: SlotId) -> HashSet<SubmissionId> {
        SlotId::ALL
            .into_iter()
            .filter(|other| *other != slot)
            .flat_map(|other| self.slot(other).playlist.submission_ids())
            .collect()
    }

    /// First non-empty slot after `from` in rotation order, `from` itself last.
    fn next_playable(&self, from: SlotId) -> Option<SlotId> {
        [from.next(), from.next().next(), from]
            .into_iter()
            .find(|slot| !self.slot(*slot).playlist.is_empty())
    }

    fn playback_state(&self) -> PlaybackState {
        match self.phase {
            Phase::Idle => PlaybackState::Idle,
            Phase::Exhausted => PlaybackState::Exhausted,
            Phase::Playing if self.slots.iter().any(|s| s.rebuilding) => {
                PlaybackState::Rebuilding
            }
            Phase::Playing => PlaybackState::Playing,
        }
    }
}

pub struct SlideshowSession {
    slideshow: Slideshow,
    display_id: String,
    // "<slideshow> on <display>", prefixes every log line
    label: String,
    store: Arc<dyn SubmissionStore>,
    builder: PlaylistBuilder,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    background: watch::Sender<usize>,
    shutdown: Notify,
}

/// Counts a background task for `wait_for_background` until dropped.
struct BackgroundTask(Arc<SlideshowSession>);

impl BackgroundTask {
    fn new(session: &Arc<SlideshowSession>) -> Self {
        session.background.send_modify(|n| *n += 1);
        Self(Arc::clone(session))
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.0.background.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl SlideshowSession {
    pub fn new(
        slideshow: Slideshow,
        display_id: impl Into<String>,
        store: Arc<dyn SubmissionStore>,
        config: &SlideshowConfig,
    ) -> Arc<Self> {
        let settings = SessionSettings::resolve(config, &slideshow);
        let builder = PlaylistBuilder::new(
            Classifier::new(settings.square_tolerance),
            settings.target_slides,
        );
        let (background, _) = watch::channel(0);
        let display_id = display_id.into();
        let label = format!("{} on {}", slideshow.id, display_id);

        Arc::new(Self {
            slideshow,
            display_id,
            label,
            store,
            builder,
            settings,
            state: Mutex::new(SessionState {
                slots: Default::default(),
                active: SlotId::A,
                position: 0,
                phase: Phase::Idle,
                bootstrapping: false,
                retrying: false,
                closed: false,
                last_polled: Instant::now(),
            }),
            background,
            shutdown: Notify::new(),
        })
    }

    pub fn slideshow(&self) -> &Slideshow {
        &self.slideshow
    }

    pub fn display_id(&self) -> &str {
        &self.display_id
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // State stays consistent between statements, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builds A, then B excluding A, then C excluding A and B, and starts
    /// playing. Without content the session becomes `Exhausted` and keeps
    /// retrying in the background.
    pub async fn start(self: &Arc<Self>) -> PlaybackState {
        {
            let mut st = self.lock();
            if st.closed || st.bootstrapping || st.phase == Phase::Playing {
                return st.playback_state();
            }
            st.bootstrapping = true;
        }

        let _task = BackgroundTask::new(self);
        let outcome = self.bootstrap().await;

        let mut st = self.lock();
        st.bootstrapping = false;
        if st.closed {
            return st.playback_state();
        }
        if st.phase == Phase::Playing {
            // a rebuild recovered playback while we were querying
            debug!(
                "Slideshow {}: discarding bootstrap, playback already resumed",
                self.label
            );
            return st.playback_state();
        }

        match outcome {
            Ok(playlists) => {
                for (slot, playlist) in SlotId::ALL.into_iter().zip(playlists) {
                    let slot = st.slot_mut(slot);
                    slot.playlist = playlist;
                    slot.generation += 1;
                }
                st.position = 0;

                match st.next_playable(SlotId::C) {
                    Some(first) => {
                        st.active = first;
                        st.phase = Phase::Playing;
                        info!(
                            "Slideshow {}: playback started ({} / {} / {} slides in A / B / C)",
                            self.label,
                            st.slot(SlotId::A).playlist.len(),
                            st.slot(SlotId::B).playlist.len(),
                            st.slot(SlotId::C).playlist.len()
                        );
                    }
                    None => {
                        st.active = SlotId::A;
                        st.phase = Phase::Exhausted;
                        info!(
                            "Slideshow {}: no eligible submissions yet, retrying every {:?}",
                            self.label, self.settings.retry_interval
                        );
                        self.ensure_retry_loop(&mut st);
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Slideshow {}: bootstrap failed, retrying in {:?}: {}",
                    self.label, self.settings.retry_interval, e
                );
                st.phase = Phase::Exhausted;
                self.ensure_retry_loop(&mut st);
            }
        }

        st.playback_state()
    }

    /// Runs `start` on a background task that `wait_for_background` tracks
    /// from the moment this returns.
    pub fn spawn_start(self: &Arc<Self>) {
        let task = BackgroundTask::new(self);
        tokio::spawn(async move {
            task.0.start().await;
            drop(task);
        });
    }

    async fn bootstrap(&self) -> Result<[Playlist; 3], RebuildError> {
        let mut exclude = HashSet::new();
        let mut playlists: [Playlist; 3] = Default::default();

        for slot in SlotId::ALL {
            let playlist = self.fetch_playlist(&exclude).await?;
            exclude.extend(playlist.submission_ids());
            playlists[slot.index()] = playlist;
        }

        Ok(playlists)
    }

    async fn fetch_playlist(
        &self,
        exclude: &HashSet<SubmissionId>,
    ) -> Result<Playlist, RebuildError> {
        let timeout = self.settings.rebuild_timeout;
        let query = self
            .store
            .query_eligible(&self.slideshow, exclude, self.settings.candidate_limit);

        let candidates = tokio::time::timeout(timeout, query)
            .await
            .map_err(|_| RebuildError::Timeout(timeout))??;

        Ok(self.builder.build_from(candidates, exclude))
    }

    /// The slide to render now, `None` while idle, exhausted or closed.
    pub fn current_slide(&self) -> Option<Arc<Slide>> {
        let mut st = self.lock();
        st.last_polled = Instant::now();
        if st.closed || st.phase != Phase::Playing {
            return None;
        }
        st.slot(st.active).playlist.get(st.position).cloned()
    }

    /// Moves past the slide on screen. Records its plays in the background
    /// and, when the active playlist runs out, rotates to the next slot and
    /// refills the finished one. Never waits on the store.
    ///
    /// Must be called from within a tokio runtime.
    pub fn advance(self: &Arc<Self>) {
        let mut st = self.lock();
        st.last_polled = Instant::now();
        if st.closed || st.phase != Phase::Playing {
            return;
        }

        let active = st.active;
        let shown: Vec<SubmissionId> = st
            .slot(active)
            .playlist
            .get(st.position)
            .map(|slide| slide.member_ids().collect())
            .unwrap_or_default();

        st.position += 1;
        if st.position >= st.slot(active).playlist.len() {
            // the refill of `active` has to rank its last slide as played
            self.rotate(&mut st, active, shown);
        } else {
            self.spawn_record_plays(shown);
        }
    }

    fn rotate(
        self: &Arc<Self>,
        st: &mut SessionState,
        finished: SlotId,
        shown: Vec<SubmissionId>,
    ) {
        self.request_rebuild(st, finished, shown);
        st.position = 0;

        match st.next_playable(finished) {
            Some(next) => {
                if next == finished {
                    debug!(
                        "Slideshow {}: slots {} and {} are empty, replaying {}",
                        self.label,
                        finished.next(),
                        finished.next().next(),
                        finished
                    );
                }
                st.active = next;
            }
            None => {
                st.phase = Phase::Exhausted;
                info!("Slideshow {}: all playlists empty", self.label);
                self.ensure_retry_loop(st);
            }
        }
    }

    /// Refills `slot` on a background task. `plays` are recorded on the same
    /// task before the query, so the new playlist already counts them.
    fn request_rebuild(
        self: &Arc<Self>,
        st: &mut SessionState,
        slot: SlotId,
        plays: Vec<SubmissionId>,
    ) {
        if st.closed {
            return;
        }
        if st.slot(slot).rebuilding {
            debug!(
                "Slideshow {}: rebuild of slot {} already in flight",
                self.label, slot
            );
            self.spawn_record_plays(plays);
            return;
        }

        let exclude = st.ids_outside(slot);
        let generation = st.slot(slot).generation;
        st.slot_mut(slot).rebuilding = true;

        let task = BackgroundTask::new(self);
        tokio::spawn(async move {
            let session = Arc::clone(&task.0);
            session.record_plays(&plays).await;
            let result = session.fetch_playlist(&exclude).await;
            session.finish_rebuild(slot, generation, result);
            drop(task);
        });
    }

    fn finish_rebuild(
        self: &Arc<Self>,
        slot: SlotId,
        generation: u64,
        result: Result<Playlist, RebuildError>,
    ) {
        let mut st = self.lock();
        st.slot_mut(slot).rebuilding = false;
        if st.closed {
            return;
        }

        let mut playlist = match result {
            Ok(playlist) => playlist,
            Err(e) => {
                warn!(
                    "Slideshow {}: rebuild of slot {} failed, keeping previous playlist: {}",
                    self.label, slot, e
                );
                return;
            }
        };

        if st.slot(slot).generation != generation {
            debug!(
                "Slideshow {}: dropping outdated rebuild of slot {}",
                self.label, slot
            );
            return;
        }

        // Other slots may have been swapped since the exclusions were taken.
        let dropped = playlist.remove_overlapping(&st.ids_outside(slot));
        if dropped > 0 {
            debug!(
                "Slideshow {}: dropped {} overlapping slides from slot {}",
                self.label, dropped, slot
            );
        }

        debug!(
            "Slideshow {}: slot {} rebuilt with {} slides",
            self.label,
            slot,
            playlist.len()
        );
        let is_empty = playlist.is_empty();
        let target = st.slot_mut(slot);
        target.playlist = playlist;
        target.generation += 1;

        let phase = st.phase;
        match phase {
            Phase::Playing if st.active == slot => {
                st.position = 0;
                if is_empty {
                    match st.next_playable(slot) {
                        Some(next) => st.active = next,
                        None => {
                            st.phase = Phase::Exhausted;
                            info!("Slideshow {}: all playlists empty", self.label);
                            self.ensure_retry_loop(&mut st);
                        }
                    }
                }
            }
            Phase::Exhausted if !is_empty => {
                st.active = slot;
                st.position = 0;
                st.phase = Phase::Playing;
                info!(
                    "Slideshow {}: content available again, playback resumed",
                    self.label
                );
            }
            _ => {}
        }
    }

    async fn record_plays(&self, ids: &[SubmissionId]) {
        if ids.is_empty() {
            return;
        }
        let timeout = self.settings.rebuild_timeout;
        let write = self.store.record_plays(ids, self.slideshow.id);
        match tokio::time::timeout(timeout, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                "Slideshow {}: failed to record plays for {:?}: {}",
                self.label, ids, e
            ),
            Err(_) => warn!(
                "Slideshow {}: recording plays for {:?} timed out after {:?}",
                self.label, ids, timeout
            ),
        }
    }

    fn spawn_record_plays(self: &Arc<Self>, ids: Vec<SubmissionId>) {
        if ids.is_empty() {
            return;
        }
        let task = BackgroundTask::new(self);
        tokio::spawn(async move {
            task.0.record_plays(&ids).await;
            drop(task);
        });
    }

    fn ensure_retry_loop(self: &Arc<Self>, st: &mut SessionState) {
        if st.retrying || st.closed {
            return;
        }
        st.retrying = true;

        let session = Arc::clone(self);
        tokio::spawn(async move { session.retry_loop().await });
    }

    async fn retry_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.settings.retry_interval) => {}
                _ = self.shutdown.notified() => {}
            }

            {
                let mut st = self.lock();
                if st.closed || st.phase == Phase::Playing {
                    st.retrying = false;
                    return;
                }
            }

            debug!("Slideshow {}: retrying bootstrap", self.label);
            let state = self.start().await;

            if state != PlaybackState::Exhausted {
                let mut st = self.lock();
                if st.closed || st.phase != Phase::Exhausted {
                    st.retrying = false;
                    return;
                }
            }
        }
    }

    /// Union of submission ids resident in all three slots.
    pub fn excluded_ids(&self) -> HashSet<SubmissionId> {
        let st = self.lock();
        st.slots
            .iter()
            .flat_map(|slot| slot.playlist.submission_ids())
            .collect()
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().playback_state()
    }

    pub fn playlist(&self, slot: SlotId) -> Playlist {
        self.lock().slot(slot).playlist.clone()
    }

    pub fn status(&self) -> SessionStatus {
        let st = self.lock();
        let state = st.playback_state();
        let playing = matches!(state, PlaybackState::Playing | PlaybackState::Rebuilding);

        SessionStatus {
            slideshow_id: self.slideshow.id,
            display_id: self.display_id.clone(),
            state,
            active_slot: playing.then_some(st.active),
            position: st.position,
            display_duration_ms: self.settings.display_duration_ms,
            slots: SlotId::ALL
                .into_iter()
                .map(|id| {
                    let slot = st.slot(id);
                    SlotStatus {
                        slot: id,
                        slides: slot.playlist.len(),
                        submissions: slot.playlist.submission_ids().len(),
                        rebuilding: slot.rebuilding,
                    }
                })
                .collect(),
        }
    }

    /// Time since the renderer last asked for or advanced a slide.
    pub fn idle_for(&self) -> Duration {
        self.lock().last_polled.elapsed()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Stops playback and the retry loop. Results of tasks still in flight
    /// are discarded.
    pub fn close(&self) {
        self.lock().closed = true;
        self.shutdown.notify_waiters();
        info!("Slideshow {}: session closed", self.label);
    }

    /// Number of bootstraps, rebuilds and play recordings still in flight.
    pub fn background_tasks(&self) -> usize {
        *self.background.borrow()
    }

    /// Resolves once no bootstrap, rebuild or play recording is in flight.
    pub async fn wait_for_background(&self) {
        let mut rx = self.background.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_types::{SlideshowScope, SubmissionSummary};
    use crate::submission_store::StoreResult;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 18, 0, 0).unwrap()
    }

    fn summary(id: SubmissionId, w: i64, h: i64) -> SubmissionSummary {
        SubmissionSummary {
            id,
            image_url: format!("https://cdn.example.com/{}.jpg", id),
            width: Some(w),
            height: Some(h),
            play_count: 0,
            created_at: base_time() + chrono::Duration::seconds(id),
        }
    }

    #[derive(Default)]
    struct FakeStore {
        submissions: Mutex<Vec<SubmissionSummary>>,
        plays: Mutex<Vec<Vec<SubmissionId>>>,
        fail_queries: AtomicBool,
        fail_writes: AtomicBool,
        query_delay: Mutex<Option<Duration>>,
        write_delay: Mutex<Option<Duration>>,
        queries: AtomicUsize,
    }

    impl FakeStore {
        fn with_landscapes(ids: impl IntoIterator<Item = SubmissionId>) -> Arc<Self> {
            let store = FakeStore::default();
            *store.submissions.lock().unwrap() =
                ids.into_iter().map(|id| summary(id, 1920, 1080)).collect();
            Arc::new(store)
        }

        fn add(&self, submission: SubmissionSummary) {
            self.submissions.lock().unwrap().push(submission);
        }

        fn remove_all(&self) {
            self.submissions.lock().unwrap().clear();
        }

        fn recorded_plays(&self) -> Vec<Vec<SubmissionId>> {
            self.plays.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SubmissionStore for FakeStore {
        async fn load_slideshow(&self, _id: SlideshowId) -> StoreResult<Option<Slideshow>> {
            Ok(None)
        }

        async fn query_eligible(
            &self,
            _slideshow: &Slideshow,
            exclude: &HashSet<SubmissionId>,
            limit: Option<u32>,
        ) -> StoreResult<Vec<SubmissionSummary>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let delay = *self.query_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_queries.load(Ordering::SeqCst) {
                return Err(StoreError::Invalid("injected query failure".into()));
            }

            let mut eligible: Vec<SubmissionSummary> = self
                .submissions
                .lock()
                .unwrap()
                .iter()
                .filter(|s| !exclude.contains(&s.id))
                .cloned()
                .collect();
            eligible.sort_by(|a, b| {
                a.play_count
                    .cmp(&b.play_count)
                    .then(a.created_at.cmp(&b.created_at))
            });
            if let Some(limit) = limit {
                eligible.truncate(limit as usize);
            }
            Ok(eligible)
        }

        async fn record_plays(
            &self,
            ids: &[SubmissionId],
            _slideshow_id: SlideshowId,
        ) -> StoreResult<()> {
            let delay = *self.write_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Invalid("injected write failure".into()));
            }
            for submission in self.submissions.lock().unwrap().iter_mut() {
                if ids.contains(&submission.id) {
                    submission.play_count += 1;
                }
            }
            self.plays.lock().unwrap().push(ids.to_vec());
            Ok(())
        }
    }

    fn slideshow() -> Slideshow {
        Slideshow {
            id: 7,
            name: "Main stage".to_string(),
            scope: SlideshowScope::Event("summer-fest".to_string()),
            display_duration_ms: None,
            target_slides: None,
            created_at: base_time(),
        }
    }

    fn config(target_slides: Option<usize>) -> SlideshowConfig {
        SlideshowConfig {
            target_slides,
            candidate_limit: None,
            rebuild_timeout: Duration::from_millis(500),
            retry_interval: Duration::from_millis(10),
            ..SlideshowConfig::default()
        }
    }

    fn session_with(store: Arc<FakeStore>, target_slides: Option<usize>) -> Arc<SlideshowSession> {
        SlideshowSession::new(slideshow(), "stage-left", store, &config(target_slides))
    }

    fn slot_ids(session: &SlideshowSession, slot: SlotId) -> HashSet<SubmissionId> {
        session.playlist(slot).submission_ids()
    }

    fn assert_slots_disjoint(session: &SlideshowSession) {
        let a = slot_ids(session, SlotId::A);
        let b = slot_ids(session, SlotId::B);
        let c = slot_ids(session, SlotId::C);
        assert!(a.is_disjoint(&b), "A and B overlap");
        assert!(a.is_disjoint(&c), "A and C overlap");
        assert!(b.is_disjoint(&c), "B and C overlap");
    }

    async fn wait_until(session: &SlideshowSession, state: PlaybackState) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while session.state() != state {
            assert!(Instant::now() < deadline, "timed out waiting for {:?}", state);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_new_session_is_idle() {
        let session = session_with(FakeStore::with_landscapes(1..=3), None);
        assert_eq!(session.state(), PlaybackState::Idle);
        assert!(session.current_slide().is_none());

        // advancing before bootstrap is a no-op
        session.advance();
        assert_eq!(session.state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_bootstrap_builds_disjoint_slots() {
        let store = FakeStore::with_landscapes(1..=9);
        let session = session_with(store, Some(3));

        assert_eq!(session.start().await, PlaybackState::Playing);

        assert_eq!(slot_ids(&session, SlotId::A), [1, 2, 3].into_iter().collect());
        assert_eq!(slot_ids(&session, SlotId::B), [4, 5, 6].into_iter().collect());
        assert_eq!(slot_ids(&session, SlotId::C), [7, 8, 9].into_iter().collect());
        assert_slots_disjoint(&session);

        let slide = session.current_slide().unwrap();
        assert_eq!(slide.members[0].id, 1);
        assert_eq!(session.excluded_ids().len(), 9);
    }

    #[tokio::test]
    async fn test_advance_records_plays_in_background() {
        let store = FakeStore::with_landscapes(1..=9);
        let session = session_with(store.clone(), Some(3));
        session.start().await;

        session.advance();
        session.advance();
        session.wait_for_background().await;

        assert_eq!(store.recorded_plays(), vec![vec![1], vec![2]]);
        assert_eq!(session.current_slide().unwrap().members[0].id, 3);
    }

    #[tokio::test]
    async fn test_refill_ranks_last_slide_as_played() {
        // A=[1], B=[2], C=[3], 4 waits in reserve
        let store = FakeStore::with_landscapes(1..=4);
        *store.write_delay.lock().unwrap() = Some(Duration::from_millis(50));
        let session = session_with(store.clone(), Some(1));
        session.start().await;

        session.advance();
        session.wait_for_background().await;

        assert_eq!(store.recorded_plays(), vec![vec![1]]);
        assert_eq!(slot_ids(&session, SlotId::A), [4].into_iter().collect());
    }

    #[tokio::test]
    async fn test_plays_are_recorded_while_rebuild_in_flight() {
        let store = FakeStore::with_landscapes(1..=2);
        let session = session_with(store.clone(), None);
        session.start().await;
        *store.query_delay.lock().unwrap() = Some(Duration::from_millis(50));

        // the second rotation finds A still rebuilding
        for _ in 0..4 {
            session.advance();
        }
        session.wait_for_background().await;

        let mut plays = store.recorded_plays();
        plays.sort();
        assert_eq!(plays, vec![vec![1], vec![1], vec![2], vec![2]]);
    }

    #[tokio::test]
    async fn test_play_recording_failure_does_not_affect_playback() {
        let store = FakeStore::with_landscapes(1..=9);
        store.fail_writes.store(true, Ordering::SeqCst);
        let session = session_with(store.clone(), Some(3));
        session.start().await;

        session.advance();
        session.wait_for_background().await;

        assert!(store.recorded_plays().is_empty());
        assert_eq!(session.state(), PlaybackState::Playing);
        assert_eq!(session.current_slide().unwrap().members[0].id, 2);
    }

    #[tokio::test]
    async fn test_rotation_rebuilds_finished_slot() {
        let store = FakeStore::with_landscapes(1..=12);
        let session = session_with(store.clone(), Some(3));
        session.start().await;

        for _ in 0..3 {
            session.advance();
        }

        // B plays now while A is refilled in the background
        let status = session.status();
        assert_eq!(status.active_slot, Some(SlotId::B));
        assert_eq!(status.position, 0);
        assert_eq!(session.current_slide().unwrap().members[0].id, 4);

        session.wait_for_background().await;

        // A excluded B and C; 10..12 were never played so they come first
        assert_eq!(
            slot_ids(&session, SlotId::A),
            [10, 11, 12].into_iter().collect()
        );
        assert_slots_disjoint(&session);
        assert_eq!(session.state(), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_full_cycle_wraps_back_to_a() {
        let store = FakeStore::with_landscapes(1..=9);
        let session = session_with(store, Some(3));
        session.start().await;

        for _ in 0..9 {
            session.advance();
            session.wait_for_background().await;
            assert_slots_disjoint(&session);
        }

        assert_eq!(session.status().active_slot, Some(SlotId::A));
        assert!(session.current_slide().is_some());
    }

    #[tokio::test]
    async fn test_advance_never_waits_for_rebuild() {
        let store = FakeStore::with_landscapes(1..=9);
        let session = session_with(store.clone(), Some(3));
        session.start().await;
        *store.query_delay.lock().unwrap() = Some(Duration::from_millis(200));

        let started = Instant::now();
        for _ in 0..3 {
            session.advance();
        }
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(session.state(), PlaybackState::Rebuilding);
        assert!(session.status().slots[0].rebuilding);
        assert!(session.current_slide().is_some());

        session.wait_for_background().await;
        assert_eq!(session.state(), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_second_rebuild_of_same_slot_is_not_launched() {
        // Only A has content, so every rotation lands on A again
        let store = FakeStore::with_landscapes(1..=2);
        let session = session_with(store.clone(), None);
        session.start().await;
        let queries_after_bootstrap = store.queries.load(Ordering::SeqCst);
        *store.query_delay.lock().unwrap() = Some(Duration::from_millis(50));

        for _ in 0..6 {
            session.advance();
        }
        session.wait_for_background().await;

        assert_eq!(
            store.queries.load(Ordering::SeqCst),
            queries_after_bootstrap + 1
        );
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_stale_playlist() {
        let store = FakeStore::with_landscapes(1..=9);
        let session = session_with(store.clone(), Some(3));
        session.start().await;
        let stale = slot_ids(&session, SlotId::A);

        store.fail_queries.store(true, Ordering::SeqCst);
        for _ in 0..3 {
            session.advance();
        }
        session.wait_for_background().await;

        assert_eq!(slot_ids(&session, SlotId::A), stale);
        assert_eq!(session.state(), PlaybackState::Playing);
        assert!(!session.status().slots[0].rebuilding);

        // playback carries on through B and C and back into the stale A
        for _ in 0..6 {
            session.advance();
        }
        assert_eq!(session.status().active_slot, Some(SlotId::A));
        assert_eq!(session.current_slide().unwrap().members[0].id, 1);
    }

    #[tokio::test]
    async fn test_rebuild_timeout_keeps_stale_playlist() {
        let store = FakeStore::with_landscapes(1..=9);
        let session = session_with(store.clone(), Some(3));
        session.start().await;
        let stale = slot_ids(&session, SlotId::A);

        *store.query_delay.lock().unwrap() = Some(Duration::from_secs(5));
        for _ in 0..3 {
            session.advance();
        }
        session.wait_for_background().await;

        assert_eq!(slot_ids(&session, SlotId::A), stale);
        assert!(!session.status().slots[0].rebuilding);
    }

    #[tokio::test]
    async fn test_small_pool_replays_single_slot() {
        let store = FakeStore::with_landscapes(1..=2);
        let session = session_with(store, None);
        session.start().await;

        assert_eq!(session.playlist(SlotId::A).len(), 2);
        assert!(session.playlist(SlotId::B).is_empty());
        assert!(session.playlist(SlotId::C).is_empty());

        session.advance();
        session.advance();
        assert_eq!(session.status().active_slot, Some(SlotId::A));
        assert!(session.current_slide().is_some());

        session.wait_for_background().await;
        assert_eq!(session.playlist(SlotId::A).len(), 2);
        assert_eq!(session.state(), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn test_empty_store_is_exhausted_then_recovers() {
        let store = Arc::new(FakeStore::default());
        let session = session_with(store.clone(), None);

        assert_eq!(session.start().await, PlaybackState::Exhausted);
        assert!(session.current_slide().is_none());

        store.add(summary(1, 1920, 1080));
        wait_until(&session, PlaybackState::Playing).await;
        assert_eq!(session.current_slide().unwrap().members[0].id, 1);
    }

    #[tokio::test]
    async fn test_failed_bootstrap_is_retried() {
        let store = FakeStore::with_landscapes(1..=3);
        store.fail_queries.store(true, Ordering::SeqCst);
        let session = session_with(store.clone(), None);

        assert_eq!(session.start().await, PlaybackState::Exhausted);

        store.fail_queries.store(false, Ordering::SeqCst);
        wait_until(&session, PlaybackState::Playing).await;
        assert!(session.current_slide().is_some());
    }

    #[tokio::test]
    async fn test_content_removed_leads_to_exhausted() {
        let store = FakeStore::with_landscapes(1..=1);
        let session = session_with(store.clone(), None);
        session.start().await;

        store.remove_all();
        session.advance();
        session.wait_for_background().await;

        assert_eq!(session.state(), PlaybackState::Exhausted);
        assert!(session.current_slide().is_none());
        assert!(session.excluded_ids().is_empty());

        store.add(summary(2, 1920, 1080));
        wait_until(&session, PlaybackState::Playing).await;
        assert_eq!(session.current_slide().unwrap().members[0].id, 2);
    }

    #[tokio::test]
    async fn test_close_stops_playback() {
        let store = FakeStore::with_landscapes(1..=3);
        let session = session_with(store.clone(), None);
        session.start().await;

        session.close();
        assert!(session.is_closed());
        assert!(session.current_slide().is_none());

        session.advance();
        session.wait_for_background().await;
        assert!(store.recorded_plays().is_empty());
    }

    #[tokio::test]
    async fn test_settings_resolution() {
        let mut show = slideshow();
        show.display_duration_ms = Some(3000);
        show.target_slides = Some(0);

        let settings = SessionSettings::resolve(&config(Some(30)), &show);
        assert_eq!(settings.display_duration_ms, 3000);
        assert_eq!(settings.target_slides, None);

        let settings = SessionSettings::resolve(&config(Some(30)), &slideshow());
        assert_eq!(settings.display_duration_ms, 8000);
        assert_eq!(settings.target_slides, Some(30));
    }

    #[tokio::test]
    async fn test_status_names_display() {
        let session = session_with(FakeStore::with_landscapes(1..=3), None);
        session.start().await;

        let status = session.status();
        assert_eq!(status.slideshow_id, 7);
        assert_eq!(status.display_id, "stage-left");
        assert_eq!(session.display_id(), "stage-left");
    }
}
