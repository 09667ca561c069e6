//! patchwork - headless patch host
//!
//! Runs a patch on a dedicated runtime thread and logs what it does. Type
//! `quit` on stdin to stop a patch started without `--frames`.

use anyhow::Context;
use clap::Parser;
use patchwork_rs::{
    config::{self, AppState, RuntimeConfig, RUNTIME_CONFIG_FILE},
    patch::{PatchBridge, RuntimeBuilder, RuntimeMessage},
    AudioBridge,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "patchwork", version, about = "Run a patchwork patch without a UI")]
struct Args {
    /// Patch file to open (defaults to `startup_patch` in the config)
    #[arg(short, long)]
    patch: Option<PathBuf>,

    /// Runtime configuration file
    #[arg(short, long, default_value = RUNTIME_CONFIG_FILE)]
    config: PathBuf,

    /// Override the configured frame rate
    #[arg(long)]
    fps: Option<u32>,

    /// Stop after this many frames (0 = run until `quit`)
    #[arg(long, default_value_t = 0)]
    frames: u64,

    /// Do not start audio processing
    #[arg(long)]
    no_dsp: bool,

    /// Print the object catalog and exit
    #[arg(long)]
    list_types: bool,

    /// Print audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,patchwork_rs=debug"))
    };

    let file_layer = config::ensure_app_data_dir().ok().map(|dir| {
        let appender = tracing_appender::rolling::daily(dir.join("logs"), "patchwork.log");
        tracing_appender::non_blocking(appender)
    });

    match file_layer {
        Some((writer, guard)) => {
            tracing_subscriber::registry()
                .with(filter())
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter())
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    }
}

fn print_catalog() {
    let registry = patchwork_rs::patch::ObjectRegistry::builtin();
    for (category, descriptors) in registry.catalog() {
        println!("{}", category);
        for d in descriptors {
            let note = if d.singleton { " (one per patch)" } else { "" };
            println!("  {:<16} {}{}", d.type_name, d.description, note);
        }
    }
}

fn print_devices(runtime_config: &RuntimeConfig) -> anyhow::Result<()> {
    let bridge = match runtime_config.backend {
        config::BackendKind::Cpal => AudioBridge::new(
            Box::new(patchwork_rs::audio::CpalBackend::new()),
            runtime_config.audio,
        ),
        config::BackendKind::Offline => AudioBridge::offline(runtime_config.audio),
    };
    for device in bridge.list_devices().context("Failed to enumerate audio devices")? {
        println!(
            "{:>3}  {}{}  (in {}, out {})",
            device.index,
            device.name,
            if device.is_default { " *" } else { "" },
            device.inputs,
            device.outputs
        );
    }
    Ok(())
}

fn log_message(msg: &RuntimeMessage) {
    match msg {
        RuntimeMessage::PatchLoaded { path, report } => {
            if !report.is_clean() {
                tracing::warn!(
                    "{:?} loaded with {} skipped objects and {} refused links",
                    path,
                    report.skipped.len(),
                    report.links_refused
                );
            }
        }
        RuntimeMessage::Audio(status) => {
            tracing::info!(
                "Audio: {} {} ({} units, {} cords){}",
                status.backend,
                if status.dsp_on { "on" } else { "off" },
                status.units,
                status.cords,
                if status.degraded { " [offline fallback]" } else { "" }
            );
        }
        RuntimeMessage::Error(e) => tracing::error!("{}", e),
        _ => tracing::trace!("{:?}", msg),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging();

    if args.list_types {
        print_catalog();
        return Ok(());
    }

    let mut runtime_config = RuntimeConfig::load_or_default(&args.config);
    if let Some(fps) = args.fps {
        runtime_config.fps = fps;
    }

    if args.list_devices {
        return print_devices(&runtime_config);
    }

    tracing::info!("Starting patchwork");

    let mut app_state = AppState::load_or_default();
    app_state.cleanup_missing_patches();
    let app_state_path = config::app_state_path();

    let patch = args.patch.clone().or_else(|| runtime_config.startup_patch.clone());
    let dsp = runtime_config.dsp_on_launch && !args.no_dsp;
    let max_frames = (args.frames > 0).then_some(args.frames);

    let (bridge, cmd_rx, msg_tx) = PatchBridge::new();
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    let runtime_handle = std::thread::Builder::new()
        .name("patch-runtime".into())
        .spawn(move || {
            let mut builder = RuntimeBuilder::new(runtime_config).messages(msg_tx);
            if let Some(path) = app_state_path {
                builder = builder.app_state(app_state, path);
            }
            let mut runtime = builder.build();

            if let Some(path) = patch {
                if let Err(e) = runtime.open_patch(&path) {
                    tracing::error!("Failed to open {:?}: {}", path, e);
                }
            }
            if dsp {
                if let Err(e) = runtime.activate_dsp() {
                    tracing::error!("Failed to start audio: {}", e);
                }
            }
            runtime.run(&cmd_rx, &running_clone, max_frames);
        })
        .context("Failed to spawn runtime thread")?;

    if max_frames.is_none() {
        let cmd_tx = bridge.cmd_tx.clone();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines().map_while(Result::ok) {
                if line.trim() == "quit" {
                    let _ = cmd_tx.send(patchwork_rs::PatchCommand::Shutdown);
                    break;
                }
            }
        });
    }

    loop {
        match bridge.msg_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(RuntimeMessage::Shutdown) => break,
            Ok(msg) => log_message(&msg),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if runtime_handle.is_finished() {
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    running.store(false, Ordering::Relaxed);
    tracing::info!("Shutting down...");
    runtime_handle
        .join()
        .map_err(|_| anyhow::anyhow!("Runtime thread panicked"))?;
    Ok(())
}
