use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use haptic_sync_core::{
    BundledAssetStore, PlaybackSession, PlayerConfig, Playlist, SimulatedHaptic, SimulatedMedia,
    SyncError, TracingSink, TransportState,
};
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn main() -> haptic_sync_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Provision { assets, config } => run_provision(&assets, config.as_deref()),
        Commands::Play {
            assets,
            config,
            speed,
            offset,
            duration_ms,
            switch_after_ms,
        } => run_play(
            &assets,
            config.as_deref(),
            PlayOptions {
                speed,
                offset,
                duration_ms,
                switch_after: switch_after_ms.map(Duration::from_millis),
            },
        ),
    }
}

fn run_provision(assets: &AssetDirs, config: Option<&Path>) -> haptic_sync_core::Result<()> {
    let config = load_config(config)?;
    let playlist = build_playlist(assets, &config)?;
    let rendered = serde_json::to_string_pretty(&playlist)
        .map_err(|err| SyncError::msg(format!("could not render the playlist: {err}")))?;
    println!("{rendered}");
    Ok(())
}

struct PlayOptions {
    speed: Option<f32>,
    offset: Option<i64>,
    duration_ms: u64,
    switch_after: Option<Duration>,
}

fn run_play(
    assets: &AssetDirs,
    config: Option<&Path>,
    options: PlayOptions,
) -> haptic_sync_core::Result<()> {
    let config = load_config(config)?;
    let playlist = build_playlist(assets, &config)?;
    tracing::info!(tracks = playlist.len(), "starting playback");

    let mut session = PlaybackSession::new(
        playlist,
        Box::new(SimulatedMedia::new(options.duration_ms)),
        Box::new(SimulatedHaptic::default()),
        &config,
    )
    .with_sink(Arc::new(TracingSink));

    session.load(0)?;
    if let Some(offset) = options.offset {
        session.set_offset(offset);
    }
    match options.speed {
        // Setting the speed also starts playback.
        Some(speed) => session.set_speed(speed)?,
        None => session.start()?,
    }

    let started = Instant::now();
    let mut switch_after = options.switch_after;
    loop {
        thread::sleep(POLL_INTERVAL);

        if switch_after.is_some_and(|after| started.elapsed() >= after) {
            switch_after = None;
            session.switch_asset()?;
            if let Some(offset) = options.offset {
                session.set_offset(offset);
            }
            continue;
        }

        if session.pump_events()? && session.state() == TransportState::Idle {
            tracing::info!(
                index = session.current_index(),
                sample = session.sample(),
                "playback finished"
            );
            break;
        }
    }

    session.close();
    Ok(())
}

fn load_config(path: Option<&Path>) -> haptic_sync_core::Result<PlayerConfig> {
    match path {
        Some(path) => PlayerConfig::from_json_file(path),
        None => Ok(PlayerConfig::default()),
    }
}

fn build_playlist(assets: &AssetDirs, config: &PlayerConfig) -> haptic_sync_core::Result<Playlist> {
    let store = BundledAssetStore::new(&assets.bundle, &assets.data);
    tracing::info!(data_dir = ?store.data_dir(), "provisioning assets");
    Playlist::from_entries(&config.playlist, &store)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio player with synchronized haptics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct AssetDirs {
    /// Directory holding the bundled media and haptic files.
    #[arg(long)]
    bundle: PathBuf,
    /// Writable directory the assets are copied into before playback.
    #[arg(long)]
    data: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Copy the playlist's assets into the data directory and print it.
    Provision {
        #[command(flatten)]
        assets: AssetDirs,
        /// Optional JSON player configuration.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Play the first asset until it completes.
    Play {
        #[command(flatten)]
        assets: AssetDirs,
        /// Optional JSON player configuration.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Playback speed multiplier.
        #[arg(long)]
        speed: Option<f32>,
        /// Sync offset in milliseconds; negative values delay the haptics.
        #[arg(long, allow_hyphen_values = true)]
        offset: Option<i64>,
        /// Length of the simulated media.
        #[arg(long, default_value_t = 5_000)]
        duration_ms: u64,
        /// Switch to the next asset once after this many milliseconds.
        #[arg(long)]
        switch_after_ms: Option<u64>,
    },
}
