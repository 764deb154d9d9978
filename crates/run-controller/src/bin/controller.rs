//! Run controller binary entry point
//!
//! Reads single-key commands from stdin (`s`, `p`, `q`, `k`) and logs every
//! event of the run.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use life_core::LifeConfig;
use run_controller::{command, Params, PgmStore, RunController};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "run_controller=info,life_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = LifeConfig::load()?;

    // Coordinator address from args or config
    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.controller.coordinator_address.clone());

    let store = PgmStore::new(&config.controller.image_dir, &config.controller.output_dir);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let controller = match RunController::connect(
        &address,
        &config.network,
        Params::from(&config.controller),
        Arc::new(store),
        events_tx,
    )
    .await
    {
        Ok(controller) => controller.with_poll_interval(config.controller.poll_interval),
        Err(e) => {
            tracing::error!(error = %e, "Could not connect to the coordinator");
            return Err(e.into());
        }
    };

    let sink = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            tracing::info!("{}", event);
        }
    });

    let (commands_tx, commands_rx) = mpsc::channel(16);
    let _stdin = command::spawn_stdin_reader(commands_tx);

    let report = controller.run(commands_rx).await?;
    sink.await?;

    tracing::info!(
        final_turn = report.final_turn,
        alive = report.alive.len(),
        "Controller finished"
    );
    Ok(())
}
