//! site-geocoder - Geocoding service with Hexagonal Architecture
//!
//! This is the composition root that wires together all the components.

use site_geocoder::adapters::inbound::ApiServer;
use site_geocoder::infrastructure::{shutdown_signal, RateLimiter, ResultCache};
use site_geocoder::{load_config, GeocodingService};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    // ===== COMPOSITION ROOT =====

    // 1. Create the application service (outbound adapters are built from cfg)
    let service = Arc::new(GeocodingService::from_config(&cfg)?);

    tracing::info!(
        "starting site-geocoder listen={} provider={} fallback={:?}",
        cfg.listen_addr,
        service.active_provider(),
        service.fallback_provider()
    );

    // 2. Background maintenance for in-memory state
    RateLimiter::start_cleanup_with_arc(service.rate_limiter().clone(), Duration::from_secs(60));
    ResultCache::start_cleanup_with_arc(service.cache().clone(), Duration::from_secs(60));

    // 3. Create inbound adapter and run
    let server = ApiServer::new(cfg.listen_addr.clone(), service);

    server.run(shutdown_signal()).await
}
