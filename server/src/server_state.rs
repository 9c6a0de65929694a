use gpx_routes_data_management::DataManager;
use tokio::sync::mpsc;

pub struct ServerState {
    pub data_manager: DataManager,
    // Freshly ingested routes waiting for background enrichment.
    pub job_tx: mpsc::Sender<i64>,
}
