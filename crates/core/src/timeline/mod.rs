//! Periodic scheduling for the position feed loop.
//!
//! A [`TickDriver`] owns the timing primitive; [`FeedLoop`] binds a driver to
//! the reference clock and a progress sink. The loop only exists between
//! `activate` and `cancel`, both issued by the owning session.

use std::{
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, select, Sender};

use crate::{ProgressSink, ReferenceClock, Result};

/// Shortest period any driver schedules; shorter requests are raised to it.
pub const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Work executed on every tick.
pub type TickFn = Box<dyn FnMut() + Send>;

/// Periodic scheduling primitive with an explicit active/inactive gate.
pub trait TickDriver: Send {
    /// Starts invoking `tick` every `period`, beginning immediately.
    /// Re-activating replaces the previous schedule.
    fn activate(&mut self, period: Duration, tick: TickFn) -> Result<()>;

    /// Stops scheduling. When this returns no tick is running and none will
    /// run; a tick already in flight is allowed to finish first.
    fn cancel(&mut self);

    fn is_active(&self) -> bool;
}

/// Drives ticks from a dedicated background thread.
#[derive(Debug, Default)]
pub struct ThreadTicker {
    worker: Option<(Sender<()>, JoinHandle<()>)>,
}

impl ThreadTicker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TickDriver for ThreadTicker {
    fn activate(&mut self, period: Duration, mut tick: TickFn) -> Result<()> {
        self.cancel();
        let period = period.max(MIN_TICK_PERIOD);

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("feed-loop".to_string())
            .spawn(move || {
                let ticker = crossbeam_channel::tick(period);
                loop {
                    tick();
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {}
                    }
                }
            })?;

        self.worker = Some((stop_tx, handle));
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some((stop_tx, handle)) = self.worker.take() {
            // Dropping the sender disconnects the channel, which also wakes
            // the select.
            drop(stop_tx);
            if handle.join().is_err() {
                tracing::warn!("feed loop thread panicked");
            }
        }
    }

    fn is_active(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for ThreadTicker {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Tick driver advanced by hand, for deterministic tests and offline
/// rendering. Clones share the same schedule.
#[derive(Clone, Default)]
pub struct ManualTicker {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    period: Duration,
    tick: Option<TickFn>,
    now: Duration,
    next_due: Duration,
}

impl ManualTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves virtual time forward and runs every tick due strictly before the
    /// new time. Returns the number of ticks executed.
    pub fn advance(&self, by: Duration) -> usize {
        let Ok(mut state) = self.state.lock() else {
            return 0;
        };
        state.now += by;

        let mut fired = 0;
        while state.tick.is_some() && state.next_due < state.now {
            if let Some(tick) = state.tick.as_mut() {
                tick();
            }
            let period = state.period;
            state.next_due += period;
            fired += 1;
        }
        fired
    }
}

impl TickDriver for ManualTicker {
    fn activate(&mut self, period: Duration, tick: TickFn) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| crate::SyncError::msg("manual ticker has been poisoned"))?;
        state.period = period.max(MIN_TICK_PERIOD);
        let now = state.now;
        state.next_due = now;
        state.tick = Some(tick);
        Ok(())
    }

    fn cancel(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.tick = None;
        }
    }

    fn is_active(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.tick.is_some())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for ManualTicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualTicker")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Samples the reference clock and pushes progress while the media engine is
/// playing. Returns the fraction that was pushed, if any.
pub fn feed_tick(clock: &ReferenceClock, sink: &dyn ProgressSink) -> Option<f32> {
    match clock.snapshot() {
        Ok(snapshot) if snapshot.playing => {
            let fraction = snapshot.progress();
            tracing::trace!(sample = snapshot.sample_ms, fraction, "feed tick");
            sink.progress(fraction);
            Some(fraction)
        }
        Ok(_) => None,
        Err(err) => {
            tracing::warn!(%err, "feed tick could not read the reference clock");
            None
        }
    }
}

/// Position feed loop scoped to a playback session.
pub struct FeedLoop {
    driver: Box<dyn TickDriver>,
    period: Duration,
}

impl FeedLoop {
    pub fn new(driver: Box<dyn TickDriver>, period: Duration) -> Self {
        if period < MIN_TICK_PERIOD {
            tracing::warn!(
                requested_ms = period.as_millis() as u64,
                "feed period too short, using the minimum"
            );
        }
        Self {
            driver,
            period: period.max(MIN_TICK_PERIOD),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn activate(&mut self, clock: ReferenceClock, sink: Arc<dyn ProgressSink>) -> Result<()> {
        tracing::debug!(period_ms = self.period.as_millis() as u64, "feed loop activated");
        self.driver.activate(
            self.period,
            Box::new(move || {
                feed_tick(&clock, sink.as_ref());
            }),
        )
    }

    /// Synchronous: returns only once no further tick can touch the engines.
    pub fn cancel(&mut self) {
        if self.driver.is_active() {
            self.driver.cancel();
            tracing::debug!("feed loop cancelled");
        }
    }

    pub fn is_active(&self) -> bool {
        self.driver.is_active()
    }
}

impl std::fmt::Debug for FeedLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedLoop")
            .field("period", &self.period)
            .field("active", &self.is_active())
            .finish()
    }
}
