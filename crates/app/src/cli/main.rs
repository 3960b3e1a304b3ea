//! faderlink CLI Application

mod listing;

use anyhow::{Context, Result};
use clap::Parser;
use faderlink_core::domain::{
    AppConfig, AssignmentStore, AudioTargetRegistry, ConfigManager, DeviceLayout, EventDispatcher,
    MigrationResolver,
};
use faderlink_infra::{midi, PactlServer};
use faderlink_web::WebContext;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long the web server gets to wind down on exit
const WEB_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "faderlink", version)]
#[command(about = "Drive PulseAudio volumes from a MIDI control surface", long_about = None)]
struct Cli {
    /// List MIDI ports and audio objects, then exit
    #[arg(long)]
    list: bool,

    /// List MIDI ports, then exit
    #[arg(long)]
    list_midi: bool,

    /// List audio devices and streams, then exit
    #[arg(long)]
    list_pulse: bool,

    /// List audio objects with ids and properties, then exit
    #[arg(long)]
    list_pulse_detailed: bool,

    /// Do not start the web UI
    #[arg(long)]
    no_webui: bool,

    /// Web UI listen address
    #[arg(long, value_name = "ADDR:PORT")]
    web_addr: Option<String>,

    /// Bindings file to use instead of the default lookup
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Application settings file
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn listing(&self) -> Option<listing::Request> {
        let midi = self.list || self.list_midi;
        let audio = self.list || self.list_pulse || self.list_pulse_detailed;
        (midi || audio).then_some(listing::Request {
            midi,
            audio,
            detailed: self.list_pulse_detailed,
        })
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "faderlink=debug" } else { "faderlink=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(request) = cli.listing() {
        return listing::run(request).await;
    }

    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "faderlink starting");

    let server = Arc::new(
        PactlServer::connect()
            .await
            .context("Audio server is not reachable")?,
    );

    let settings_path = match cli.settings {
        Some(path) => path,
        None => ConfigManager::default_config_dir()?.join(AppConfig::FILE_NAME),
    };
    let mut settings = AppConfig::load_or_default(&settings_path).await;
    if let Some(addr) = cli.web_addr {
        settings.web_addr = addr;
    }
    if cli.no_webui {
        settings.web_enabled = false;
    }

    let manager = Arc::new(ConfigManager::discover(cli.config).context("Failed to locate bindings file")?);
    let outcome = manager.load().await;
    info!(
        path = %outcome.path.display(),
        origin = ?outcome.origin,
        controls = outcome.config.len(),
        "Bindings loaded"
    );
    if manager.writes_held() {
        warn!(
            path = %outcome.path.display(),
            "Bindings file left untouched; edits this session will not be saved"
        );
    }
    let device = outcome.config.device.clone();

    let store = Arc::new(AssignmentStore::new(
        outcome.config,
        manager,
        settings.save_debounce(),
    ));
    let registry = Arc::new(
        AudioTargetRegistry::new(server.clone()).with_timeout(settings.audio_timeout()),
    );
    let migrator = Arc::new(MigrationResolver::new(store.clone(), registry.clone()));
    let dispatcher = Arc::new(EventDispatcher::new(
        store.clone(),
        migrator,
        DeviceLayout::default(),
    ));

    tokio::spawn(dispatcher.clone().watch_assignments(store.subscribe_changes()));

    let (events_tx, events_rx) = mpsc::channel(settings.midi_event_buffer.max(1));
    let midi_input = match midi::open_input(&device.in_port, events_tx) {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(
                device = %device.name,
                port = %device.in_port,
                error = %e,
                "MIDI input unavailable, continuing without hardware control"
            );
            None
        }
    };
    tokio::spawn(dispatcher.clone().run(events_rx));

    let (stop_web, web_stopped) = oneshot::channel::<()>();
    let web = if settings.web_enabled {
        let addr: SocketAddr = settings
            .web_addr
            .parse()
            .with_context(|| format!("Invalid web UI address '{}'", settings.web_addr))?;

        let ctx = WebContext::new(store.clone(), registry.clone());
        server.spawn_subscription(ctx.poll_trigger());
        faderlink_web::spawn_background(&ctx, settings.structural_poll_interval());

        Some(tokio::spawn(async move {
            let shutdown = async {
                let _ = web_stopped.await;
            };
            if let Err(e) = faderlink_web::serve(addr, ctx, shutdown).await {
                error!(error = %e, "Web UI failed");
            }
        }))
    } else {
        info!("Web UI disabled");
        None
    };

    dispatcher.startup_sweep().await;
    info!("faderlink running, press Ctrl-C to exit");

    shutdown_signal().await;
    info!("Shutting down");

    let _ = stop_web.send(());
    if let Err(e) = store.flush().await {
        error!(error = %e, "Failed to save bindings on exit");
    }
    if let Some(web) = web {
        if tokio::time::timeout(WEB_SHUTDOWN_GRACE, web).await.is_err() {
            warn!("Web UI did not stop in time");
        }
    }
    drop(midi_input);

    info!("Goodbye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
