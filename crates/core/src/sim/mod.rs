//! Wall-clock engines used by the command line player and integration tests.
//!
//! Neither engine decodes anything. The media engine advances a playhead in
//! real time at the configured speed; the haptic engine checks that its source
//! is a well-formed pattern document and pulls the reference time on its own
//! cadence while playing.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, select, Sender};

use crate::{
    CompletionCallback, EngineFault, EngineResult, HapticEngine, MediaEngine, PositionCallback,
};

/// Playhead that advances with wall-clock time, scaled by speed.
#[derive(Debug, Clone)]
struct Playhead {
    anchor_ms: f64,
    running_since: Option<Instant>,
    speed: f32,
}

impl Default for Playhead {
    fn default() -> Self {
        Self {
            anchor_ms: 0.0,
            running_since: None,
            speed: 1.0,
        }
    }
}

impl Playhead {
    fn position_ms(&self) -> f64 {
        match self.running_since {
            Some(since) => {
                self.anchor_ms + since.elapsed().as_secs_f64() * 1000.0 * self.speed as f64
            }
            None => self.anchor_ms,
        }
    }

    fn run(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    fn hold(&mut self) {
        self.anchor_ms = self.position_ms();
        self.running_since = None;
    }

    fn seek(&mut self, position_ms: f64) {
        self.anchor_ms = position_ms;
        if self.running_since.is_some() {
            self.running_since = Some(Instant::now());
        }
    }

    fn set_speed(&mut self, speed: f32) {
        let running = self.running_since.is_some();
        self.hold();
        self.speed = speed;
        if running {
            self.run();
        }
    }
}

/// Media engine with a fixed duration that plays silence in real time.
pub struct SimulatedMedia {
    duration_ms: u64,
    source: Option<PathBuf>,
    playhead: Playhead,
    completion: Option<CompletionCallback>,
    completed: AtomicBool,
}

impl SimulatedMedia {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            source: None,
            playhead: Playhead::default(),
            completion: None,
            completed: AtomicBool::new(false),
        }
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn raw_position(&self) -> u64 {
        (self.playhead.position_ms().max(0.0) as u64).min(self.duration_ms)
    }

    fn at_end(&self) -> bool {
        self.raw_position() >= self.duration_ms
    }

    /// Fires the completion callback the first time the running playhead is
    /// observed at the end of the media.
    fn observe_end(&self) {
        if self.playhead.running_since.is_some()
            && self.at_end()
            && !self.completed.swap(true, Ordering::AcqRel)
        {
            tracing::debug!(duration_ms = self.duration_ms, "simulated media reached its end");
            if let Some(completion) = self.completion.as_ref() {
                completion();
            }
        }
    }

    fn require_source(&self) -> EngineResult<()> {
        if self.source.is_none() {
            return Err(EngineFault::new("no source has been prepared"));
        }
        Ok(())
    }
}

impl MediaEngine for SimulatedMedia {
    fn reset(&mut self) {
        self.source = None;
        self.playhead = Playhead::default();
        self.completed.store(false, Ordering::Release);
    }

    fn load_source(&mut self, path: &Path) -> EngineResult<()> {
        let metadata = std::fs::metadata(path)
            .map_err(|err| EngineFault::new(format!("cannot open media: {err}")))?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(EngineFault::new("media source is empty or not a file"));
        }
        self.source = Some(path.to_path_buf());
        Ok(())
    }

    fn set_completion_callback(&mut self, callback: CompletionCallback) {
        self.completion = Some(callback);
    }

    fn start(&mut self) -> EngineResult<()> {
        self.require_source()?;
        if self.completed.load(Ordering::Acquire) || self.at_end() {
            self.playhead.seek(0.0);
            self.completed.store(false, Ordering::Release);
        }
        self.playhead.run();
        Ok(())
    }

    fn pause(&mut self) -> EngineResult<()> {
        self.require_source()?;
        self.playhead.hold();
        Ok(())
    }

    fn stop(&mut self) -> EngineResult<()> {
        self.require_source()?;
        self.playhead.hold();
        self.playhead.seek(0.0);
        Ok(())
    }

    fn seek_to(&mut self, position_ms: u64) -> EngineResult<()> {
        self.require_source()?;
        self.playhead.seek(position_ms.min(self.duration_ms) as f64);
        self.completed.store(false, Ordering::Release);
        Ok(())
    }

    fn set_speed(&mut self, multiplier: f32) -> EngineResult<()> {
        self.require_source()?;
        self.playhead.set_speed(multiplier);
        // Changing the rate resumes playback, as platform media players do.
        self.playhead.run();
        Ok(())
    }

    fn speed(&self) -> f32 {
        self.playhead.speed
    }

    fn current_position(&self) -> u64 {
        self.observe_end();
        self.raw_position()
    }

    fn duration(&self) -> u64 {
        self.duration_ms
    }

    fn is_playing(&self) -> bool {
        self.observe_end();
        self.playhead.running_since.is_some() && !self.at_end()
    }
}

/// Parameters the haptic source was bound with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HapticSource {
    pub path: PathBuf,
    pub amplitude: u8,
    pub channel: u32,
    /// Number of entries in the document's `Pattern` array.
    pub event_count: usize,
}

/// Haptic engine that follows the reference clock by pulling it.
pub struct SimulatedHaptic {
    cadence: Duration,
    source: Option<HapticSource>,
    position: Option<PositionCallback>,
    speed: f32,
    reference_ms: Arc<AtomicI64>,
    puller: Option<(Sender<()>, JoinHandle<()>)>,
}

impl Default for SimulatedHaptic {
    fn default() -> Self {
        Self::new(Duration::from_millis(20))
    }
}

impl SimulatedHaptic {
    /// `cadence` is how often the engine pulls the reference time while
    /// playing.
    pub fn new(cadence: Duration) -> Self {
        Self {
            cadence,
            source: None,
            position: None,
            speed: 1.0,
            reference_ms: Arc::new(AtomicI64::new(0)),
            puller: None,
        }
    }

    pub fn source(&self) -> Option<&HapticSource> {
        self.source.as_ref()
    }

    /// Reference time most recently pulled (or seeked to).
    pub fn reference_ms(&self) -> i64 {
        self.reference_ms.load(Ordering::Acquire)
    }

    pub fn is_playing(&self) -> bool {
        self.puller.is_some()
    }

    fn require_source(&self) -> EngineResult<PositionCallback> {
        match (&self.source, &self.position) {
            (Some(_), Some(position)) => Ok(position.clone()),
            _ => Err(EngineFault::new("no pattern has been prepared")),
        }
    }

    fn halt_puller(&mut self) {
        if let Some((stop_tx, handle)) = self.puller.take() {
            drop(stop_tx);
            if handle.join().is_err() {
                tracing::warn!("haptic puller thread panicked");
            }
        }
    }
}

impl HapticEngine for SimulatedHaptic {
    fn reset(&mut self) {
        self.halt_puller();
        self.source = None;
        self.position = None;
        self.speed = 1.0;
        self.reference_ms.store(0, Ordering::Release);
    }

    fn load_source(
        &mut self,
        path: &Path,
        amplitude: u8,
        channel: u32,
        position: PositionCallback,
    ) -> EngineResult<()> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| EngineFault::new(format!("cannot open pattern: {err}")))?;
        let document: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|err| EngineFault::new(format!("malformed pattern: {err}")))?;
        if !document.is_object() {
            return Err(EngineFault::new("pattern document must be a JSON object"));
        }
        let event_count = document
            .get("Pattern")
            .and_then(|pattern| pattern.as_array())
            .map_or(0, Vec::len);

        tracing::debug!(?path, amplitude, channel, event_count, "haptic pattern prepared");
        self.source = Some(HapticSource {
            path: path.to_path_buf(),
            amplitude,
            channel,
            event_count,
        });
        self.position = Some(position);
        Ok(())
    }

    fn start(&mut self) -> EngineResult<()> {
        let position = self.require_source()?;
        if self.puller.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let reference_ms = self.reference_ms.clone();
        let cadence = self.cadence;
        let handle = thread::Builder::new()
            .name("haptic-puller".to_string())
            .spawn(move || {
                let ticker = crossbeam_channel::tick(cadence);
                loop {
                    reference_ms.store(position(), Ordering::Release);
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {}
                    }
                }
            })
            .map_err(|err| EngineFault::new(format!("cannot spawn puller: {err}")))?;

        self.puller = Some((stop_tx, handle));
        Ok(())
    }

    fn pause(&mut self) -> EngineResult<()> {
        self.require_source()?;
        self.halt_puller();
        Ok(())
    }

    fn stop(&mut self) -> EngineResult<()> {
        self.require_source()?;
        self.halt_puller();
        self.reference_ms.store(0, Ordering::Release);
        Ok(())
    }

    fn seek_to(&mut self, position_ms: u64) -> EngineResult<()> {
        self.require_source()?;
        self.reference_ms.store(position_ms as i64, Ordering::Release);
        Ok(())
    }

    fn set_speed(&mut self, multiplier: f32) -> EngineResult<()> {
        self.require_source()?;
        self.speed = multiplier;
        Ok(())
    }

    fn speed(&self) -> f32 {
        self.speed
    }
}

impl Drop for SimulatedHaptic {
    fn drop(&mut self) {
        self.halt_puller();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir()
            .join(format!("haptic-sync-sim-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn media_refuses_missing_or_empty_sources() {
        let mut media = SimulatedMedia::new(1000);
        assert!(media.load_source(Path::new("/definitely/not/here.mp3")).is_err());

        let empty = scratch_file("empty.mp3", "");
        assert!(media.load_source(&empty).is_err());
        assert!(media.start().is_err());
        std::fs::remove_file(empty).ok();
    }

    #[test]
    fn media_playhead_honours_speed_and_pause() {
        let source = scratch_file("speed.mp3", "ID3");
        let mut media = SimulatedMedia::new(60_000);
        media.load_source(&source).unwrap();

        media.set_speed(2.0).unwrap();
        assert!(media.is_playing());
        thread::sleep(Duration::from_millis(50));
        media.pause().unwrap();

        let paused_at = media.current_position();
        assert!(paused_at >= 90, "position {paused_at}");
        thread::sleep(Duration::from_millis(20));
        assert_eq!(media.current_position(), paused_at);
        assert!(!media.is_playing());

        media.seek_to(5000).unwrap();
        assert_eq!(media.current_position(), 5000);
        std::fs::remove_file(source).ok();
    }

    #[test]
    fn media_completion_fires_once() {
        let source = scratch_file("short.mp3", "ID3");
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();

        let mut media = SimulatedMedia::new(20);
        media.set_completion_callback(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        media.load_source(&source).unwrap();
        media.start().unwrap();
        thread::sleep(Duration::from_millis(50));

        assert!(!media.is_playing());
        assert_eq!(media.current_position(), 20);
        assert!(!media.is_playing());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        std::fs::remove_file(source).ok();
    }

    #[test]
    fn haptic_rejects_malformed_patterns() {
        let broken = scratch_file("broken.he", "{ not json");
        let mut haptic = SimulatedHaptic::default();

        let err = haptic
            .load_source(&broken, 255, 0, Arc::new(|| 0_i64))
            .unwrap_err();
        assert!(err.0.contains("malformed"));
        assert!(haptic.start().is_err());
        std::fs::remove_file(broken).ok();
    }

    #[test]
    fn haptic_pulls_reference_time_while_playing() {
        let pattern = scratch_file(
            "pull.he",
            r#"{ "Metadata": { "Version": 1 }, "Pattern": [ { "Event": {} }, { "Event": {} } ] }"#,
        );
        let mut haptic = SimulatedHaptic::new(Duration::from_millis(5));
        haptic
            .load_source(&pattern, 200, 1, Arc::new(|| 1234_i64))
            .unwrap();
        assert_eq!(haptic.source().map(|s| s.event_count), Some(2));

        haptic.start().unwrap();
        thread::sleep(Duration::from_millis(30));
        haptic.pause().unwrap();
        assert!(!haptic.is_playing());
        assert_eq!(haptic.reference_ms(), 1234);

        haptic.seek_to(4000).unwrap();
        assert_eq!(haptic.reference_ms(), 4000);
        std::fs::remove_file(pattern).ok();
    }
}
