//! Sync Engine main entry point.

use dotenv::dotenv;
use std::env;
use sync_engine::{runner, Dependencies, SyncEngineError};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("sync_engine=info,sync_engine_pipeline=info,sync_engine_repository=info")
    });

    let json = env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .init();
    }

    info!(
        service_name = "sync-engine",
        service_version = env!("CARGO_PKG_VERSION"),
        json,
        "Tracing initialized"
    );
}

#[tokio::main]
async fn main() -> Result<(), SyncEngineError> {
    dotenv().ok();
    init_tracing();

    let deps = match Dependencies::new().await {
        Ok(deps) => {
            info!("Dependencies initialized successfully");
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };

    let result = runner::run(&deps.config, &deps.client).await;
    deps.client.close().await;

    match result {
        Ok(()) => {
            info!("Sync engine finished");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Sync engine failed");
            Err(e)
        }
    }
}
