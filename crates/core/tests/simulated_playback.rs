use std::{
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use haptic_sync_core::{
    AssetEntry, BundledAssetStore, PlaybackSession, PlayerConfig, Playlist, RecordingSink,
    SimulatedHaptic, SimulatedMedia, TransportState,
};

const PATTERN: &str = r#"{
    "Metadata": { "Version": 1 },
    "Pattern": [
        { "Event": { "Type": "transient", "RelativeTime": 0 } },
        { "Event": { "Type": "continuous", "RelativeTime": 120, "Duration": 60 } }
    ]
}"#;

fn bundle(label: &str) -> (PathBuf, BundledAssetStore) {
    let root = std::env::temp_dir().join(format!(
        "haptic-sync-it-{label}-{}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&root);
    let bundle = root.join("bundle");
    std::fs::create_dir_all(&bundle).unwrap();
    for track in ["music1", "music2"] {
        std::fs::write(bundle.join(format!("{track}.mp3")), b"ID3\x04").unwrap();
        std::fs::write(bundle.join(format!("{track}.he")), PATTERN).unwrap();
    }
    let store = BundledAssetStore::new(&bundle, root.join("data"));
    (root, store)
}

fn config() -> PlayerConfig {
    PlayerConfig {
        feed_interval_ms: 10,
        ..PlayerConfig::default()
    }
}

#[test]
fn plays_to_completion_and_rearms() {
    let (root, store) = bundle("complete");
    let config = config();
    let playlist = Playlist::from_entries(&config.playlist, &store).unwrap();
    let sink = Arc::new(RecordingSink::new());

    let mut session = PlaybackSession::new(
        playlist,
        Box::new(SimulatedMedia::new(150)),
        Box::new(SimulatedHaptic::new(Duration::from_millis(5))),
        &config,
    )
    .with_sink(sink.clone());

    session.load(0).unwrap();
    session.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(3);
    let mut completed = false;
    while Instant::now() < deadline {
        if session.pump_events().unwrap() {
            completed = true;
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    assert!(completed, "media never reported completion");
    assert_eq!(session.state(), TransportState::Idle);
    assert!(session.is_loaded());
    assert!(!session.is_feed_active());

    let progress = sink.progress_updates();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(
        sink.transitions(),
        vec![
            TransportState::Idle,
            TransportState::Playing,
            TransportState::Idle
        ]
    );

    session.close();
    std::fs::remove_dir_all(root).ok();
}

#[test]
fn switching_assets_rebinds_both_engines() {
    let (root, store) = bundle("switch");
    let config = PlayerConfig {
        playlist: vec![
            AssetEntry::new("music1.mp3", "music1.he"),
            AssetEntry::new("music2.mp3", "music2.he"),
        ],
        ..config()
    };
    let playlist = Playlist::from_entries(&config.playlist, &store).unwrap();

    let mut session = PlaybackSession::new(
        playlist,
        Box::new(SimulatedMedia::new(60_000)),
        Box::new(SimulatedHaptic::default()),
        &config,
    );
    session.load(0).unwrap();
    session.start().unwrap();
    thread::sleep(Duration::from_millis(30));

    session.switch_asset().unwrap();
    assert_eq!(session.current_index(), 1);
    assert_eq!(session.state(), TransportState::Playing);
    assert!(session
        .current_asset()
        .unwrap()
        .media_file
        .ends_with("music2.mp3"));

    session.set_speed(2.0).unwrap();
    assert_eq!(session.engine_speeds().unwrap(), (2.0, 2.0));

    session.pause().unwrap();
    let paused = session.sample();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(session.sample(), paused);

    session.set_offset(-40);
    assert_eq!(session.sample(), paused - 40);

    session.stop().unwrap();
    assert_eq!(session.state(), TransportState::Idle);

    drop(session);
    std::fs::remove_dir_all(root).ok();
}

#[test]
fn corrupt_pattern_aborts_load() {
    let (root, store) = bundle("corrupt");
    std::fs::write(root.join("bundle").join("broken.he"), "not a pattern").unwrap();
    let config = PlayerConfig {
        playlist: vec![AssetEntry::new("music1.mp3", "broken.he")],
        ..config()
    };
    let playlist = Playlist::from_entries(&config.playlist, &store).unwrap();

    let mut session = PlaybackSession::new(
        playlist,
        Box::new(SimulatedMedia::new(1_000)),
        Box::new(SimulatedHaptic::default()),
        &config,
    );

    let err = session.load(0).unwrap_err();
    assert!(format!("{err}").contains("broken.he"));
    assert!(!session.is_loaded());
    assert!(session.start().is_err());

    drop(session);
    std::fs::remove_dir_all(root).ok();
}
