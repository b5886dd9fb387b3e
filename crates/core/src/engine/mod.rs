//! Boundary traits for the two playback engines.
//!
//! The media engine is the timing reference and can be asked for its
//! position. The haptic engine cannot: it is handed a [`PositionCallback`] at
//! load time and pulls the reference time through it on its own cadence.

use std::{fmt, path::Path, sync::Arc};

/// Zero-argument function returning the current reference time in
/// milliseconds. Invoked by the haptic engine from its own threads.
pub type PositionCallback = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Fired by the media engine exactly once per natural end of stream.
pub type CompletionCallback = Box<dyn Fn() + Send + Sync>;

/// Failure reported by an engine implementation. The session attaches the
/// engine role and the command before surfacing it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct EngineFault(pub String);

impl EngineFault {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineFault>;

/// Which side of the pair an engine plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineRole {
    /// Audio engine whose position is the reference clock.
    Primary,
    /// Haptic pattern engine slaved to the reference clock.
    Secondary,
}

impl fmt::Display for EngineRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineRole::Primary => write!(f, "media"),
            EngineRole::Secondary => write!(f, "haptic"),
        }
    }
}

/// Audio playback engine used as the reference clock.
pub trait MediaEngine: Send {
    /// Drops the current source and returns to an unprepared state.
    fn reset(&mut self);

    /// Binds and prepares `path`. Called once per load, no retries.
    fn load_source(&mut self, path: &Path) -> EngineResult<()>;

    fn set_completion_callback(&mut self, callback: CompletionCallback);

    fn start(&mut self) -> EngineResult<()>;
    fn pause(&mut self) -> EngineResult<()>;
    fn stop(&mut self) -> EngineResult<()>;
    fn seek_to(&mut self, position_ms: u64) -> EngineResult<()>;

    /// Changes the playback rate. Engines are allowed to resume playback as a
    /// side effect of this call.
    fn set_speed(&mut self, multiplier: f32) -> EngineResult<()>;
    fn speed(&self) -> f32;

    fn current_position(&self) -> u64;
    fn duration(&self) -> u64;
    fn is_playing(&self) -> bool;
}

/// Haptic pattern engine driven by a pulled reference time.
pub trait HapticEngine: Send {
    fn reset(&mut self);

    fn load_source(
        &mut self,
        path: &Path,
        amplitude: u8,
        channel: u32,
        position: PositionCallback,
    ) -> EngineResult<()>;

    fn start(&mut self) -> EngineResult<()>;
    fn pause(&mut self) -> EngineResult<()>;
    fn stop(&mut self) -> EngineResult<()>;
    fn seek_to(&mut self, position_ms: u64) -> EngineResult<()>;
    fn set_speed(&mut self, multiplier: f32) -> EngineResult<()>;
    fn speed(&self) -> f32;
}
