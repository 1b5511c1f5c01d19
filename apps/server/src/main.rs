mod config;
mod control;
mod devices;
mod sampler;
mod web;

use anyhow::{Context, Result};
use clap::Parser;
use reflow_core::store::seed_builtin_profiles;
use reflow_core::{JsonProfileStore, OvenSupervisor, ProfileStore};
use std::sync::Arc;
use tokio::sync::RwLock as AsyncRwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Args, Config};
use crate::control::{ControlHandle, ControlLoop};
use crate::sampler::{spawn_sampler, CachedSource};
use crate::web::{ServerState, WebState};

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a signal handler there is no clean way out; keep running.
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);
    let config = Config::load(&args)?;
    info!("Reflow oven controller v{} starting", env!("CARGO_PKG_VERSION"));

    let store = JsonProfileStore::open(&config.profiles_dir)
        .with_context(|| format!("opening profile directory {}", config.profiles_dir.display()))?;
    seed_builtin_profiles(&store).context("seeding built-in profiles")?;
    info!("Profiles in {}: {:?}", store.dir().display(), store.list()?);
    let store: Arc<dyn ProfileStore> = Arc::new(store);

    let (sensor, heater) = devices::build(&config.sensor, &config.heater);
    info!("Sensor: {:?}, heater: {:?}", config.sensor, config.heater);
    let cache = CachedSource::new(config.sensor_max_age());
    let sampler = spawn_sampler(
        sensor,
        cache.clone(),
        config.tick_period(),
        config.sensor_timeout(),
    );

    let supervisor = OvenSupervisor::new(cache, heater, config.oven());
    let server_state = Arc::new(AsyncRwLock::new(ServerState::new(supervisor.snapshot())));
    let (control, commands) = ControlHandle::channel();

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    let web_state = WebState {
        server_state: server_state.clone(),
        control,
        store,
    };
    let web = tokio::spawn(async move {
        if let Err(e) = web::serve(listener, web_state).await {
            error!("Web server failed: {}", e);
        }
    });

    let control_loop = ControlLoop {
        supervisor,
        state: server_state,
        tick_period: config.tick_period(),
        history_window_s: config.history_window_s,
    };
    control_loop.run(commands, shutdown_signal()).await;

    web.abort();
    sampler.abort();
    info!("Stopped");
    Ok(())
}
