//! photolink-server: upload link API
//!
//! Serves issuance and redemption over HTTP and runs the orphaned blob
//! reaper and the quota reconciler in the background.
//!
//! ## Architecture
//! ```text
//! [Client] -> [HTTP API :8080] -> [Issuance / Redemption]
//!                                    |              |
//!                                    v              v
//!                            [Document store]  [Blob store]
//!                                    ^              ^
//!                                    |              |
//!                              [Reconciler]   [Orphan reaper]
//! ```
//!
//! ## Configuration
//! - `--config <path>` or PHOTOLINK_CONFIG: YAML configuration file
//! - PHOTOLINK__SERVER__PORT, PHOTOLINK__STORAGE__TYPE, ...: overrides
//! - PHOTOLINK_LOG: log filter (default: info)

use std::sync::Arc;

use tracing::{error, info};

use photolink::blob_store::{init_blob_store, orphan_channel};
use photolink::clock::SystemClock;
use photolink::config::Config;
use photolink::http::{serve, AppState, Components};
use photolink::identity::init_identity;
use photolink::services::Reconciler;
use photolink::storage::init_storage;
use photolink::utils::bootstrap::{init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let storage = init_storage(&config.storage).await?;
    let blobs = init_blob_store(&config.blob_store, &config.server.public_base_url).await?;
    let identity = init_identity(&config.identity, config.timeouts.identity())?;

    let (orphans, reaper) = orphan_channel(Arc::clone(&blobs));
    let reaper = reaper
        .with_interval(config.blob_store.orphan_sweep_interval())
        .spawn();

    let reconciliation = Arc::clone(&storage.reconciliation);
    let state = Arc::new(AppState::new(
        &config,
        Components {
            storage,
            blobs,
            orphans,
            identity,
            clock: Arc::new(SystemClock),
        },
    ));

    let reconciler = Reconciler::new(
        Arc::clone(&state.ledger),
        reconciliation,
        state.timeouts,
    )
    .with_interval(config.reconciliation.interval())
    .spawn();

    info!(
        tiers = config.tiers.tiers().count(),
        storage = ?config.storage.storage_type,
        blob_store = ?config.blob_store.store_type,
        "photolink server starting"
    );

    let addr = config.server.bind_addr();
    let result = serve(state, &addr)
        .await
        .map_err(|e| -> Box<dyn std::error::Error> { e });

    reconciler.abort();
    // The reaper exits on its own once the last queue handle is dropped.
    if let Err(e) = reaper.await {
        error!(error = %e, "Orphan reaper task failed");
    }
    result
}
