use anyhow::Result;
use rollcall_core::detector::UltraFaceDetector;
use rollcall_core::embedder::FaceNetEmbedder;
use rollcall_store::{AdminCredentialFile, Store};
use tracing_subscriber::EnvFilter;

mod bus;
mod config;
mod error;
mod service;
mod worker;

use config::Config;
use service::AttendanceService;

const BUS_NAME: &str = "org.rollcall.Attendance1";
const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");
    let config = Config::from_env();

    // Fail fast: every resource is opened before the bus name is claimed.
    let detector = UltraFaceDetector::load(&config.detector_model_path())?;
    let embedder = FaceNetEmbedder::load(&config.embedder_model_path())?;
    let store = Store::open(&config.db_path)?;
    let admin = AdminCredentialFile::open(&config.admin_path)?;

    let service = AttendanceService::new(
        Box::new(detector),
        Box::new(embedder),
        store,
        admin,
        config.distance_threshold,
    );
    let handle = worker::spawn_service(service);

    let _connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, bus::AttendanceBus::new(handle))?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
