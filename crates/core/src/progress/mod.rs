use std::sync::Mutex;

use crate::{AudioAsset, TransportState};

/// Receiver of everything a player UI would render: playback progress and
/// transport label changes.
pub trait ProgressSink: Send + Sync {
    /// `fraction` is always within `[0, 1]`.
    fn progress(&self, fraction: f32);

    fn transport_changed(&self, state: TransportState, asset: &AudioAsset);
}

/// Sink that discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn progress(&self, _fraction: f32) {}

    fn transport_changed(&self, _state: TransportState, _asset: &AudioAsset) {}
}

/// Sink that reports through `tracing`, for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn progress(&self, fraction: f32) {
        tracing::info!(percent = (fraction * 100.0).round() as u32, "progress");
    }

    fn transport_changed(&self, state: TransportState, asset: &AudioAsset) {
        tracing::info!(%state, media = ?asset.media_file, "transport changed");
    }
}

/// Sink that keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    progress: Mutex<Vec<f32>>,
    transitions: Mutex<Vec<TransportState>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress_updates(&self) -> Vec<f32> {
        self.progress.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn transitions(&self) -> Vec<TransportState> {
        self.transitions
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }
}

impl ProgressSink for RecordingSink {
    fn progress(&self, fraction: f32) {
        if let Ok(mut progress) = self.progress.lock() {
            progress.push(fraction);
        }
    }

    fn transport_changed(&self, state: TransportState, _asset: &AudioAsset) {
        if let Ok(mut transitions) = self.transitions.lock() {
            transitions.push(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        let asset = AudioAsset::new("a.mp3", "a.he");

        sink.transport_changed(TransportState::Idle, &asset);
        sink.progress(0.1);
        sink.transport_changed(TransportState::Playing, &asset);
        sink.progress(0.2);

        assert_eq!(sink.progress_updates(), vec![0.1, 0.2]);
        assert_eq!(
            sink.transitions(),
            vec![TransportState::Idle, TransportState::Playing]
        );
    }
}
