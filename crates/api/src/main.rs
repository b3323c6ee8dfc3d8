use std::time::Duration;

use anyhow::Result;
use sanitation_api::{build_router, build_state, ApiConfig};
use sanitation_observability::init_tracing;

const DRAFT_PURGE_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("sanitation_api");

    let config = ApiConfig::from_env();
    let bind = config.bind.clone();

    // Fails fast when the classifier or lookup tables cannot be loaded.
    let state = build_state(config).await?;

    let desk = state.desk.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(DRAFT_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            match desk.purge_expired_drafts().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "expired drafts purged"),
                Err(err) => tracing::warn!(error = %err, "draft purge failed"),
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(
        bind = %bind,
        model = %state.desk.model_name(),
        store = state.store_backend,
        "sanitation complaint api started"
    );

    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
