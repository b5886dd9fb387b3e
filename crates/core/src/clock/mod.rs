use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc, Mutex, MutexGuard,
};

use crate::{MediaEngine, PositionCallback, Result, SyncError};

/// Media engine shared between the session, the clock, and the feed loop.
/// The mutex is the single boundary serialising calls into the engine.
pub type SharedMedia = Arc<Mutex<Box<dyn MediaEngine>>>;

/// Point-in-time reading of the reference engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSnapshot {
    /// Reported position plus the sync offset.
    pub sample_ms: i64,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub playing: bool,
}

impl ClockSnapshot {
    /// Fraction of the media elapsed according to the offset sample, clamped
    /// to `[0, 1]`. An unknown duration reads as zero progress.
    pub fn progress(&self) -> f32 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        (self.sample_ms as f64 / self.duration_ms as f64).clamp(0.0, 1.0) as f32
    }
}

/// Reference clock derived from the media engine's position plus a signed,
/// user-adjustable offset.
///
/// Cloning is cheap; clones observe the same engine and offset. The haptic
/// engine receives one through [`ReferenceClock::callback`].
#[derive(Clone)]
pub struct ReferenceClock {
    media: SharedMedia,
    offset_ms: Arc<AtomicI64>,
    last_sample_ms: Arc<AtomicI64>,
}

impl ReferenceClock {
    pub fn new(media: SharedMedia) -> Self {
        Self {
            media,
            offset_ms: Arc::new(AtomicI64::new(0)),
            last_sample_ms: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::Acquire)
    }

    /// Takes effect on the next sample; no engine is touched.
    pub fn set_offset_ms(&self, offset_ms: i64) {
        self.offset_ms.store(offset_ms, Ordering::Release);
    }

    /// Current reference time in milliseconds, saturating at the `i64`
    /// bounds. Never fails: if the engine cannot be read the last valid
    /// sample is returned.
    pub fn sample(&self) -> i64 {
        match self.snapshot() {
            Ok(snapshot) => snapshot.sample_ms,
            Err(_) => self.last_sample_ms.load(Ordering::Acquire),
        }
    }

    /// Reads position, duration, and play state under a single lock.
    pub fn snapshot(&self) -> Result<ClockSnapshot> {
        let media = self.lock_media()?;
        let position_ms = media.current_position();
        let snapshot = ClockSnapshot {
            sample_ms: i64::try_from(position_ms)
                .unwrap_or(i64::MAX)
                .saturating_add(self.offset_ms()),
            position_ms,
            duration_ms: media.duration(),
            playing: media.is_playing(),
        };
        drop(media);

        self.last_sample_ms.store(snapshot.sample_ms, Ordering::Release);
        Ok(snapshot)
    }

    /// Wraps [`ReferenceClock::sample`] as the pull callback handed to the
    /// haptic engine.
    pub fn callback(&self) -> PositionCallback {
        let clock = self.clone();
        Arc::new(move || {
            let sample = clock.sample();
            tracing::trace!(sample, "haptic engine pulled reference time");
            sample
        })
    }

    fn lock_media(&self) -> Result<MutexGuard<'_, Box<dyn MediaEngine>>> {
        self.media
            .lock()
            .map_err(|_| SyncError::msg("media engine has been poisoned"))
    }
}

impl std::fmt::Debug for ReferenceClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceClock")
            .field("offset_ms", &self.offset_ms())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::{CompletionCallback, EngineResult};

    #[derive(Default)]
    struct FixedMedia {
        position: u64,
        duration: u64,
        playing: bool,
    }

    impl MediaEngine for FixedMedia {
        fn reset(&mut self) {}
        fn load_source(&mut self, _path: &Path) -> EngineResult<()> {
            Ok(())
        }
        fn set_completion_callback(&mut self, _callback: CompletionCallback) {}
        fn start(&mut self) -> EngineResult<()> {
            Ok(())
        }
        fn pause(&mut self) -> EngineResult<()> {
            Ok(())
        }
        fn stop(&mut self) -> EngineResult<()> {
            Ok(())
        }
        fn seek_to(&mut self, position_ms: u64) -> EngineResult<()> {
            self.position = position_ms;
            Ok(())
        }
        fn set_speed(&mut self, _multiplier: f32) -> EngineResult<()> {
            Ok(())
        }
        fn speed(&self) -> f32 {
            1.0
        }
        fn current_position(&self) -> u64 {
            self.position
        }
        fn duration(&self) -> u64 {
            self.duration
        }
        fn is_playing(&self) -> bool {
            self.playing
        }
    }

    fn clock_at(position: u64, duration: u64) -> ReferenceClock {
        let media: Box<dyn MediaEngine> = Box::new(FixedMedia {
            position,
            duration,
            playing: true,
        });
        ReferenceClock::new(Arc::new(Mutex::new(media)))
    }

    #[test]
    fn negative_offset_delays_the_sample() {
        let clock = clock_at(2000, 10_000);
        clock.set_offset_ms(-50);
        assert_eq!(clock.sample(), 1950);
    }

    #[test]
    fn sample_tracks_position_for_any_offset() {
        let clock = clock_at(4000, 10_000);
        for offset in [-4000, -1, 0, 1, 250, 9000] {
            clock.set_offset_ms(offset);
            assert_eq!(clock.sample(), 4000 + offset);
            assert_eq!(clock.callback()(), 4000 + offset);
        }
    }

    #[test]
    fn extreme_offsets_saturate() {
        let clock = clock_at(2000, 10_000);
        clock.set_offset_ms(i64::MAX);
        assert_eq!(clock.sample(), i64::MAX);
        assert_eq!(clock.snapshot().unwrap().progress(), 1.0);

        clock.set_offset_ms(i64::MIN);
        assert_eq!(clock.sample(), i64::MIN + 2000);
        assert_eq!(clock.callback()(), i64::MIN + 2000);

        let far = clock_at(u64::MAX, u64::MAX);
        far.set_offset_ms(1);
        assert_eq!(far.sample(), i64::MAX);
    }

    #[test]
    fn progress_is_clamped_to_unit_range() {
        let clock = clock_at(9_990, 10_000);
        clock.set_offset_ms(500);
        assert_eq!(clock.snapshot().unwrap().progress(), 1.0);

        clock.set_offset_ms(-20_000);
        assert_eq!(clock.snapshot().unwrap().progress(), 0.0);

        let empty = clock_at(0, 0);
        assert_eq!(empty.snapshot().unwrap().progress(), 0.0);
    }

    #[test]
    fn poisoned_engine_returns_last_valid_sample() {
        let media: Box<dyn MediaEngine> = Box::new(FixedMedia {
            position: 700,
            duration: 1000,
            playing: true,
        });
        let shared: SharedMedia = Arc::new(Mutex::new(media));
        let clock = ReferenceClock::new(shared.clone());
        assert_eq!(clock.sample(), 700);

        let poisoner = shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the media lock");
        })
        .join();

        assert!(clock.snapshot().is_err());
        assert_eq!(clock.sample(), 700);
    }
}
