use swingsync::cli::Args;
use swingsync::config;
use swingsync::core::event_bus::{downcast_event, BoxedEvent, EventBus};
use swingsync::core::sync_events::{
    DriftCorrectedEvent, PlaybackEndedEvent, RateChangedEvent, SlotFailedEvent, SlotReadyEvent,
};
use swingsync::core::{IntervalTicker, SimulatedBackend, SyncController, SyncEventEmitter};
use swingsync::entities::{Catalog, Side};
use swingsync::session::ComparisonSession;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// Clip length for recordings whose metadata has none
const DEFAULT_CLIP_MS: f64 = 10_000.0;

/// How often the headless host prints the transport position
const REPORT_EVERY: Duration = Duration::from_millis(250);

fn init_logging(args: &Args, path_config: &config::PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!(
            "Logging to file: {} (level: {:?})",
            log_path.display(),
            log_level
        );
    } else {
        // Console logging with specified verbosity level (respects RUST_LOG if set)
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn list_catalog(catalog: &Catalog) {
    for rec in catalog.iter() {
        let names: Vec<&str> = rec.keyframes.names().collect();
        println!("{}  {:<20} [{}]", rec.id, rec.display_name(), names.join(", "));
    }
}

/// One-line report for the transport events the CLI shows.
fn describe_event(event: &BoxedEvent) -> Option<String> {
    if let Some(e) = downcast_event::<SlotReadyEvent>(event) {
        Some(format!("[{}] ready ({:.0}ms)", e.side, e.duration_ms))
    } else if let Some(e) = downcast_event::<RateChangedEvent>(event) {
        Some(format!("Rate {}x", e.0))
    } else if let Some(e) = downcast_event::<DriftCorrectedEvent>(event) {
        Some(format!("[{}] drift of {:.0}ms corrected", e.side, e.drift_ms))
    } else {
        downcast_event::<PlaybackEndedEvent>(event)
            .map(|e| format!("Playback ended at {:.0}ms", e.position_ms))
    }
}

/// Print transport events queued since the last call.
fn report_events(bus: &EventBus) {
    for line in bus.poll().iter().filter_map(describe_event) {
        println!("{}", line);
    }
}

/// Headless player that can load every recording in the catalog
fn simulated_player(catalog: &Catalog) -> SimulatedBackend {
    catalog.iter().fold(SimulatedBackend::new(), |player, rec| {
        player.with_source(rec.source_uri.clone(), rec.duration_ms.unwrap_or(DEFAULT_CLIP_MS))
    })
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = config::PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &path_config)?;

    info!("swingsync starting...");
    debug!("Command-line args: {:?}", args);

    let settings_path = config::config_file(config::SETTINGS_FILE, &path_config);
    info!("Settings path: {}", settings_path.display());
    let settings = config::load_or_init_settings(&settings_path);

    let catalog = Catalog::from_json(&args.catalog)?;
    info!("Loaded {} recordings", catalog.len());

    if args.list {
        list_catalog(&catalog);
        return Ok(());
    }

    let left = simulated_player(&catalog);
    let right = simulated_player(&catalog);

    let ticker = IntervalTicker::new();
    let ticks = ticker.ticks();
    let bus = EventBus::new();
    bus.subscribe::<SlotFailedEvent, _>(|e| {
        eprintln!("[{}] failed to load: {}", e.side, e.reason);
    });
    let controller = SyncController::new(Box::new(left), Box::new(right), ticker, settings)
        .with_events(SyncEventEmitter::from_emitter(bus.emitter()));
    let mut session = ComparisonSession::new(catalog, controller);

    for (side, query) in [(Side::Left, &args.left), (Side::Right, &args.right)] {
        let Some(query) = query else {
            warn!("No recording given for the {} slot", side);
            continue;
        };
        session.activate_slot(side);
        session
            .choose(query)
            .with_context(|| format!("Select {} recording", side))?;
    }
    session.controller_mut().update();
    report_events(&bus);

    let common = session.common_keyframes();
    if common.is_empty() {
        println!("No common keyframes");
    } else {
        println!("Common keyframes:");
        for k in common {
            println!(
                "  {:<20} left {:>8.0}ms  right {:>8.0}ms",
                k.label, k.left_timestamp_ms, k.right_timestamp_ms
            );
        }
    }

    if let Some(name) = &args.keyframe {
        session.jump_to(name)?;
    }
    if let Some(rate) = args.rate {
        session.controller_mut().set_rate(rate)?;
    }
    report_events(&bus);

    if args.play_ms > 0 {
        let controller = session.controller_mut();
        controller.play();
        if !controller.is_playing() {
            warn!("Transport unavailable: both slots need a recording");
        }

        let deadline = Instant::now() + Duration::from_millis(args.play_ms);
        let mut last_report = Instant::now();
        while controller.is_playing() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                controller.pause();
                break;
            }
            if let Ok(id) = ticks.recv_timeout(remaining) {
                controller.on_tick(id);
            }
            report_events(&bus);
            if last_report.elapsed() >= REPORT_EVERY {
                let state = controller.state();
                println!(
                    "{:>8.0} / {:.0}ms  (left {:.0}, right {:.0})",
                    state.position_ms,
                    state.max_duration_ms,
                    controller.unit(Side::Left).position(),
                    controller.unit(Side::Right).position()
                );
                last_report = Instant::now();
            }
        }
        controller.update();
        report_events(&bus);
    }

    let state = serde_json::to_string_pretty(session.controller().state())
        .context("Serialize sync state")?;
    println!("{}", state);
    Ok(())
}
