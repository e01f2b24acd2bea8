use std::path::PathBuf;
use std::time::Duration;

/// Dockscope: resource inventory and disk-usage aggregation for a
/// Docker-compatible container engine.
///
/// This library connects to the engine daemon, normalizes its heterogeneous
/// resource records (images, containers, volumes, build cache, storage
/// layers) into canonical per-poll snapshots, links resources to each other
/// (volume usage counts, port mappings, bind mounts, log files), and folds
/// everything into the aggregate summary a dashboard consumes.
pub mod engine;
pub mod fsutil;
pub mod inventory;
pub mod scan;

/// Runs the dockscope daemon.
///
/// Connects to the engine socket, probes it once, then runs a full
/// inventory poll per interval tick, emitting each dashboard summary as one
/// JSON line on stdout. Configuration comes from the environment:
/// `ENGINE_SOCKET`, `ENGINE_TIMEOUT_SECS`, `POLL_INTERVAL_SECS`.
///
/// # Errors
///
/// Returns an error if the engine client cannot be constructed or the
/// engine does not answer the initial ping. Poll failures afterwards are
/// logged and retried on the next tick.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let socket = std::env::var_os("ENGINE_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(engine::DEFAULT_SOCKET));
    let timeout = Duration::from_secs(env_secs("ENGINE_TIMEOUT_SECS", 10));
    let interval_secs = env_secs("POLL_INTERVAL_SECS", 30).max(1);

    let client = engine::EngineClient::connect(&socket, timeout)?;
    if !client.ping().await {
        return Err(format!(
            "engine at `{}` did not answer the initial ping",
            socket.display()
        )
        .into());
    }
    log::debug!("connected to engine at {}", socket.display());

    let inventory = inventory::Inventory::new(client);
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        match inventory.dashboard_summary().await {
            Ok(summary) => {
                let line = serde_json::to_string(&summary).expect("summary serialization failed");
                println!("{line}");
            }
            Err(err) => log::error!("inventory poll failed: {err}"),
        }
    }
}

fn env_secs(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            log::warn!("ignoring non-numeric `{key}` value `{raw}`");
            default
        }),
        Err(_) => default,
    }
}
