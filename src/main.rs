//! Mealwatch worker entry point
//!
//! Wires the frame source, vision client and session tracker together
//! and runs the orchestration loop until shutdown.

use mealwatch::config::Settings;
use mealwatch::vision_client::{self, VisionClient};
use mealwatch::worker::Worker;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mealwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Mealwatch worker v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::from_env()?;
    tracing::info!(
        stream_url = %settings.stream_url,
        vision_url = %settings.vision_url,
        resolution = %format!("{}x{}", settings.capture_width, settings.capture_height),
        frame_interval_secs = settings.frame_interval_secs,
        idle_timeout_secs = settings.idle_timeout_secs,
        "Configuration loaded"
    );

    // Subject profiles give the vision service its identities to match
    let subjects = match vision_client::load_subjects(&settings.subjects_file).await {
        Ok(subjects) => {
            tracing::info!(count = subjects.len(), "Subject profiles loaded");
            subjects
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %settings.subjects_file.display(),
                "No subject profiles, running with presence detection only"
            );
            Vec::new()
        }
    };

    // One upfront health check; the worker tolerates later outages
    let vision = VisionClient::new(settings.vision_url.clone());
    if vision.health_check().await? {
        tracing::info!("Vision service reachable");
    } else {
        tracing::warn!(url = %settings.vision_url, "Vision service not responding, continuing anyway");
    }

    let worker = Worker::new(settings, subjects);
    worker.run().await?;

    tracing::info!("Worker exited cleanly");
    Ok(())
}
