//! Core library for the Haptic Sync player.
//!
//! A [`PlaybackSession`] keeps two independent engines in lockstep: a media
//! engine whose position is the timing reference, and a haptic pattern engine
//! that pulls that reference through a callback. Transport commands reach the
//! two engines in a fixed order (see [`router`]), and a periodic feed loop
//! (see [`timeline`]) reports progress while playing.

pub mod assets;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod progress;
pub mod router;
pub mod session;
pub mod sim;
pub mod timeline;

pub use assets::{AssetProvider, AudioAsset, BundledAssetStore, Playlist};
pub use clock::{ClockSnapshot, ReferenceClock, SharedMedia};
pub use config::{AssetEntry, HapticConfig, PlayerConfig};
pub use engine::{
    CompletionCallback, EngineFault, EngineResult, EngineRole, HapticEngine, MediaEngine,
    PositionCallback,
};
pub use error::{Result, SyncError};
pub use progress::{NullSink, ProgressSink, RecordingSink, TracingSink};
pub use router::{CommandPlan, CommandStep, TransportOp};
pub use session::{PlaybackSession, TransportState};
pub use sim::{HapticSource, SimulatedHaptic, SimulatedMedia};
pub use timeline::{
    feed_tick, FeedLoop, ManualTicker, ThreadTicker, TickDriver, TickFn, MIN_TICK_PERIOD,
};
