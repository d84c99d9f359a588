/// Entry point for the pingforest reachability monitor.
///
/// Loads the device tree, polls every device on its own schedule, and serves
/// the status API until Ctrl-C is received.
///
/// # Errors
///
/// Returns an error if initialization fails (e.g., invalid environment
/// variables, an unreadable tree file, or an API address that cannot be bound).
///
/// # Examples
///
/// ```bash
/// RUST_LOG=info PINGFOREST_DATA_FILE=tree_data.json cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    pingforest::run().await
}
