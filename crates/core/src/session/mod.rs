//! Playback session: owns the playlist, both engines, and the transport
//! state machine.
//!
//! ```text
//! Idle --start--> Playing --pause--> Paused --start--> Playing
//!   ^                |                  |
//!   +------stop------+-------stop-------+   (stop reloads the same asset)
//! ```
//!
//! Every command that touches both engines goes through a [`CommandPlan`],
//! which fixes the order of the two calls.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::{
    AudioAsset, CommandPlan, EngineFault, EngineRole, FeedLoop, HapticConfig, HapticEngine,
    MediaEngine, NullSink, PlayerConfig, Playlist, ProgressSink, ReferenceClock, Result,
    SharedMedia, SyncError, ThreadTicker, TickDriver, TransportOp,
};

/// Transport state as presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// Prepared but not started.
    #[default]
    Idle,
    Playing,
    Paused,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Idle => write!(f, "idle"),
            TransportState::Playing => write!(f, "playing"),
            TransportState::Paused => write!(f, "paused"),
        }
    }
}

/// Drives a media engine and a haptic engine in lockstep.
pub struct PlaybackSession {
    playlist: Playlist,
    index: usize,
    media: SharedMedia,
    haptic: Box<dyn HapticEngine>,
    clock: ReferenceClock,
    feed: FeedLoop,
    sink: Arc<dyn ProgressSink>,
    haptic_config: HapticConfig,
    default_offset_ms: i64,
    state: TransportState,
    loaded: bool,
    speed: f32,
    completion_tx: Sender<()>,
    completion_rx: Receiver<()>,
}

impl PlaybackSession {
    /// Creates a session that has not loaded anything yet. Call
    /// [`PlaybackSession::load`] before issuing transport commands.
    pub fn new(
        playlist: Playlist,
        media: Box<dyn MediaEngine>,
        haptic: Box<dyn HapticEngine>,
        config: &PlayerConfig,
    ) -> Self {
        let media: SharedMedia = Arc::new(Mutex::new(media));
        let clock = ReferenceClock::new(media.clone());
        clock.set_offset_ms(config.default_offset_ms);
        let (completion_tx, completion_rx) = unbounded();

        Self {
            playlist,
            index: 0,
            media,
            haptic,
            clock,
            feed: FeedLoop::new(Box::new(ThreadTicker::new()), config.feed_interval()),
            sink: Arc::new(NullSink),
            haptic_config: config.haptic,
            default_offset_ms: config.default_offset_ms,
            state: TransportState::Idle,
            loaded: false,
            speed: 1.0,
            completion_tx,
            completion_rx,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replaces the scheduling primitive behind the feed loop. The period is
    /// kept.
    pub fn with_tick_driver(mut self, driver: Box<dyn TickDriver>) -> Self {
        self.feed.cancel();
        self.feed = FeedLoop::new(driver, self.feed.period());
        self
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn current_asset(&self) -> Option<&AudioAsset> {
        self.playlist.get(self.index)
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn offset_ms(&self) -> i64 {
        self.clock.offset_ms()
    }

    pub fn clock(&self) -> &ReferenceClock {
        &self.clock
    }

    /// Current reference sample: media position plus sync offset.
    pub fn sample(&self) -> i64 {
        self.clock.sample()
    }

    pub fn is_feed_active(&self) -> bool {
        self.feed.is_active()
    }

    /// Multipliers currently reported by the media and haptic engines.
    pub fn engine_speeds(&self) -> Result<(f32, f32)> {
        let media = self.lock_media()?.speed();
        Ok((media, self.haptic.speed()))
    }

    /// Resets both engines and binds them to the asset at `index`. Speed and
    /// offset return to their defaults.
    ///
    /// On failure the session stays idle with neither engine primed; the
    /// caller has to load again explicitly.
    pub fn load(&mut self, index: usize) -> Result<()> {
        let asset = self
            .playlist
            .get(index)
            .cloned()
            .ok_or_else(|| SyncError::InvalidParameter {
                name: "asset index",
                reason: format!("{index} is outside a playlist of {}", self.playlist.len()),
            })?;

        self.feed.cancel();
        self.loaded = false;
        self.state = TransportState::Idle;
        self.index = index;
        self.speed = 1.0;
        self.clock.set_offset_ms(self.default_offset_ms);
        while self.completion_rx.try_recv().is_ok() {}

        self.haptic.reset();
        {
            let mut media = self.lock_media()?;
            media.reset();
            let completion_tx = self.completion_tx.clone();
            media.set_completion_callback(Box::new(move || {
                let _ = completion_tx.send(());
            }));
            media
                .load_source(&asset.media_file)
                .map_err(|fault| init_error(EngineRole::Primary, &asset.media_file, fault))?;
        }

        let HapticConfig { amplitude, channel } = self.haptic_config;
        if let Err(fault) =
            self.haptic
                .load_source(&asset.haptic_file, amplitude, channel, self.clock.callback())
        {
            self.lock_media()?.reset();
            return Err(init_error(EngineRole::Secondary, &asset.haptic_file, fault));
        }

        self.loaded = true;
        tracing::info!(
            index,
            media = ?asset.media_file,
            haptic = ?asset.haptic_file,
            "asset loaded"
        );
        self.sink.transport_changed(TransportState::Idle, &asset);
        Ok(())
    }

    /// Starts media, then haptics, and activates the feed loop.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            TransportState::Idle if self.loaded => {}
            TransportState::Paused => {}
            state => return Err(SyncError::invalid_state("start", state)),
        }

        self.run_plan(TransportOp::Start)?;
        self.enter(TransportState::Playing)
    }

    /// Pauses media, then haptics. No tick runs while paused.
    pub fn pause(&mut self) -> Result<()> {
        if self.state != TransportState::Playing {
            return Err(SyncError::invalid_state("pause", self.state));
        }

        self.feed.cancel();
        self.run_plan(TransportOp::Pause)?;
        self.enter(TransportState::Paused)
    }

    /// Stops haptics, then media, and reloads the same asset so that the
    /// next start replays it from the beginning.
    pub fn stop(&mut self) -> Result<()> {
        if self.state == TransportState::Idle {
            return Err(SyncError::invalid_state("stop", self.state));
        }

        self.halt()?;
        self.load(self.index)
    }

    /// Stops whatever is playing, loads the next asset (wrapping), and
    /// starts it.
    pub fn switch_asset(&mut self) -> Result<()> {
        if self.state != TransportState::Idle {
            self.halt()?;
        }

        let next = self.playlist.next_index(self.index);
        tracing::info!(from = self.index, to = next, "switching asset");
        self.load(next)?;
        self.start()
    }

    /// Seeks both engines to `fraction` of the media duration. Both land on
    /// the same absolute position; the sync offset is not applied.
    pub fn seek(&mut self, fraction: f32) -> Result<()> {
        if self.state == TransportState::Idle {
            return Err(SyncError::invalid_state("seek", self.state));
        }
        if !fraction.is_finite() {
            return Err(SyncError::InvalidParameter {
                name: "seek fraction",
                reason: format!("{fraction} is not a number"),
            });
        }

        let duration = self.lock_media()?.duration();
        let target = (duration as f64 * fraction.clamp(0.0, 1.0) as f64).round() as u64;
        tracing::info!(fraction, target, "seeking");
        self.run_plan(TransportOp::SeekTo(target))
    }

    /// Applies `multiplier` to media, then haptics. Media engines may resume
    /// playback when their rate changes, so a session that was not playing is
    /// started explicitly afterwards.
    pub fn set_speed(&mut self, multiplier: f32) -> Result<()> {
        if !(multiplier.is_finite() && multiplier > 0.0) {
            return Err(SyncError::InvalidParameter {
                name: "speed",
                reason: format!("{multiplier} is not a positive multiplier"),
            });
        }
        if !self.loaded {
            return Err(SyncError::invalid_state("set_speed", self.state));
        }

        self.run_plan(TransportOp::SetSpeed(multiplier))?;
        self.speed = multiplier;
        tracing::info!(multiplier, "speed changed");

        if self.state != TransportState::Playing {
            self.start()?;
        }
        Ok(())
    }

    /// Changes the sync offset. Negative values delay the haptics relative
    /// to the audio. Only the next clock sample is affected.
    pub fn set_offset(&mut self, offset_ms: i64) {
        tracing::info!(offset_ms, "sync offset changed");
        self.clock.set_offset_ms(offset_ms);
    }

    /// Handles end-of-media notifications posted by the media engine.
    /// Completion is treated exactly like [`PlaybackSession::stop`]. Returns
    /// whether a completion was consumed.
    pub fn pump_events(&mut self) -> Result<bool> {
        let mut completed = false;
        while self.completion_rx.try_recv().is_ok() {
            completed = true;
        }
        if !completed {
            return Ok(false);
        }

        tracing::info!(index = self.index, "media reached its end");
        if self.state != TransportState::Idle {
            self.stop()?;
        }
        Ok(true)
    }

    /// Cancels the feed loop, stops and resets both engines. The session can
    /// be revived with [`PlaybackSession::load`].
    pub fn close(&mut self) {
        self.feed.cancel();
        if let Err(fault) = self.haptic.stop() {
            tracing::debug!(%fault, "haptic engine refused stop during close");
        }
        self.haptic.reset();
        if let Ok(mut media) = self.media.lock() {
            if let Err(fault) = media.stop() {
                tracing::debug!(%fault, "media engine refused stop during close");
            }
            media.reset();
        }
        self.loaded = false;
        self.state = TransportState::Idle;
    }

    fn halt(&mut self) -> Result<()> {
        self.feed.cancel();
        self.run_plan(TransportOp::Stop)?;
        self.state = TransportState::Idle;
        tracing::info!(index = self.index, "playback stopped");
        Ok(())
    }

    fn run_plan(&mut self, op: TransportOp) -> Result<()> {
        let previous = self.state;
        let outcome = CommandPlan::for_op(op).execute(&self.media, &mut *self.haptic);
        if outcome.is_err() {
            self.reconcile(previous);
        }
        outcome
    }

    /// After a half-applied command the recorded state follows whatever the
    /// media engine is actually doing.
    fn reconcile(&mut self, previous: TransportState) {
        let playing = self
            .media
            .lock()
            .map(|media| media.is_playing())
            .unwrap_or(false);
        let state = match (playing, previous) {
            (true, _) => TransportState::Playing,
            (false, TransportState::Idle) => TransportState::Idle,
            (false, _) => TransportState::Paused,
        };
        tracing::warn!(%previous, %state, "reconciled transport state after engine failure");
        if let Err(err) = self.enter(state) {
            tracing::warn!(%err, "could not restore the feed loop");
        }
    }

    fn enter(&mut self, state: TransportState) -> Result<()> {
        if state == TransportState::Playing {
            if !self.feed.is_active() {
                self.feed.activate(self.clock.clone(), self.sink.clone())?;
            }
        } else {
            self.feed.cancel();
        }

        if self.state != state {
            tracing::info!(from = %self.state, to = %state, "transport state changed");
        }
        self.state = state;
        if let Some(asset) = self.playlist.get(self.index) {
            self.sink.transport_changed(state, asset);
        }
        Ok(())
    }

    fn lock_media(&self) -> Result<MutexGuard<'_, Box<dyn MediaEngine>>> {
        self.media
            .lock()
            .map_err(|_| SyncError::msg("media engine has been poisoned"))
    }
}

fn init_error(engine: EngineRole, path: &std::path::Path, fault: EngineFault) -> SyncError {
    tracing::warn!(%engine, ?path, %fault, "engine refused its source");
    SyncError::EngineInit {
        engine,
        path: path.to_path_buf(),
        reason: fault.0,
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("index", &self.index)
            .field("state", &self.state)
            .field("loaded", &self.loaded)
            .field("speed", &self.speed)
            .field("clock", &self.clock)
            .field("feed", &self.feed)
            .finish()
    }
}
