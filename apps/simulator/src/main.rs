mod config;
mod events;
mod traffic;

use std::sync::Arc;

use feedsync_core::FeedSyncService;
use feedsync_storage_memory::{memory_deps, MemoryStore};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use events::TracingEventSink;
use traffic::TrafficDriver;

fn init_tracing() {
    let log_format = std::env::var("FEED_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    traffic::seed(&store, &config);

    let deps = memory_deps(store.clone(), Arc::new(TracingEventSink));
    let service = Arc::new(FeedSyncService::new(deps, config.sync.clone()));
    for partition in &config.partitions {
        service.registry().start_listening(partition).await?;
    }
    service.start_background();

    let driver = TrafficDriver::new(store, service.clone(), config);
    tokio::select! {
        result = driver.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown requested"),
    }

    service.shutdown();
    Ok(())
}
