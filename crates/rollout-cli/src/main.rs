//! Rollout CLI binary

#[tokio::main]
async fn main() {
    std::process::exit(rollout_cli::run().await);
}
