use gpx_routes_data_management::{DataManager, ingest::RouteProcessor};
use tokio::sync::mpsc;

/// Background enrichment worker. Routes arrive over the queue right after
/// ingestion; anything left unprocessed by an earlier run is picked up at
/// startup, so every route is enriched at least once.
pub async fn run(
    data_manager: DataManager,
    processor: RouteProcessor,
    mut jobs: mpsc::Receiver<i64>,
) {
    match data_manager.unprocessed_route_ids().await {
        Ok(pending) if !pending.is_empty() => {
            tracing::info!("Resuming enrichment of {} route(s)", pending.len());
            for route_id in pending {
                process(&data_manager, &processor, route_id).await;
            }
        }
        Ok(_) => {}
        Err(err) => tracing::error!("Failed to scan for unprocessed routes: {err:?}"),
    }

    while let Some(route_id) = jobs.recv().await {
        process(&data_manager, &processor, route_id).await;
    }

    tracing::info!("Enrichment worker stopped");
}

async fn process(data_manager: &DataManager, processor: &RouteProcessor, route_id: i64) {
    if let Err(err) = data_manager.enrich_route(route_id, processor).await {
        // Leave the route unprocessed; the next start retries it.
        tracing::error!("Failed to enrich route {route_id}: {err:?}");
    } else {
        tracing::debug!("Route {route_id} enriched");
    }
}
