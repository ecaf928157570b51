use anyhow::{Context, Result};
use facekey_core::{CaptureAdapter, DirectoryPersistence};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

const BUS_NAME: &str = "org.facekey.FaceKey1";
const OBJECT_PATH: &str = "/org/facekey/FaceKey1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facekeyd starting");

    let config = config::Config::load().context("failed to load configuration")?;
    tracing::info!(
        store_dir = %config.store_dir.display(),
        store_key = %config.store_key,
        match_threshold = config.match_threshold,
        capture_timeout_secs = config.capture_timeout_secs,
        "configuration loaded"
    );

    let capture = config
        .capture
        .open()
        .context("failed to set up capture adapter")?;
    let capture_source = capture.describe();

    let persistence = DirectoryPersistence::new(&config.store_dir);
    let engine = engine::spawn_engine(capture, persistence, config.flow_settings())
        .context("failed to start engine")?;

    let service =
        dbus_interface::FaceKeyService::new(engine, config.match_threshold, capture_source);

    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on the session bus")?;

    tracing::info!(bus_name = BUS_NAME, path = OBJECT_PATH, "facekeyd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facekeyd shutting down");

    Ok(())
}
