use gpx_routes_data_management::{DataManager, ingest::RouteProcessor};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// CLI for manual data operations
#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("regenerate-thumbnails") => {
            regenerate_thumbnails(args.get(1).and_then(|arg| arg.parse().ok())).await;
        }
        Some("update-start-locations") => {
            update_start_locations().await;
        }
        Some("process-pending") => {
            process_pending().await;
        }
        _ => {
            eprintln!("usage: gpx_routes_data_management <command>");
            eprintln!();
            eprintln!("commands:");
            eprintln!("  regenerate-thumbnails [route_id]   re-render thumbnails (all routes or one)");
            eprintln!("  update-start-locations             geocode routes without a start location");
            eprintln!("  process-pending                    run enrichment for unprocessed routes");
            std::process::exit(2);
        }
    }
}

async fn regenerate_thumbnails(route_id: Option<i64>) {
    let manager = DataManager::start().await.unwrap();
    let processor = RouteProcessor::from_env().await;

    let routes = match route_id {
        Some(route_id) => vec![route_id],
        None => manager
            .get_routes(None, None)
            .await
            .unwrap()
            .into_iter()
            .map(|route| route.route_id)
            .collect(),
    };

    tracing::info!("Regenerating thumbnails for {} route(s)", routes.len());

    let mut failures = 0;
    for route_id in routes {
        if let Err(err) = manager.regenerate_thumbnail(route_id, &processor).await {
            tracing::error!("Route {route_id}: {err:?}");
            failures += 1;
        }
    }

    if failures > 0 {
        tracing::warn!("{failures} route(s) failed");
        std::process::exit(1);
    }
}

async fn update_start_locations() {
    let manager = DataManager::start().await.unwrap();
    let processor = RouteProcessor::from_env().await;

    let routes = manager.get_routes(None, None).await.unwrap();
    let missing: Vec<_> = routes
        .into_iter()
        .filter(|route| route.start_location.is_none())
        .collect();

    tracing::info!("{} route(s) without a start location", missing.len());

    for route in missing {
        match manager.update_start_location(route.route_id, &processor).await {
            Ok(true) => tracing::info!("Route {} located", route.route_id),
            Ok(false) => tracing::info!("Route {} still has no location name", route.route_id),
            Err(err) => tracing::error!("Route {}: {err:?}", route.route_id),
        }
    }
}

async fn process_pending() {
    let manager = DataManager::start().await.unwrap();
    let processor = RouteProcessor::from_env().await;

    let pending = manager.unprocessed_route_ids().await.unwrap();
    tracing::info!("{} route(s) pending enrichment", pending.len());

    for route_id in pending {
        if let Err(err) = manager.enrich_route(route_id, &processor).await {
            tracing::error!("Route {route_id}: {err:?}");
        }
    }
}
