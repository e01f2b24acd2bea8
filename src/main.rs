/// Entry point for the dockscope inventory daemon.
///
/// Connects to a Docker-compatible engine socket, polls the full resource
/// inventory on an interval, and emits one dashboard summary JSON line per
/// poll on stdout.
///
/// # Errors
///
/// Returns an error if the engine socket cannot be opened or the engine
/// does not answer the initial ping.
///
/// # Examples
///
/// ```bash
/// ENGINE_SOCKET=/var/run/docker.sock POLL_INTERVAL_SECS=30 cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    dockscope::run().await
}
