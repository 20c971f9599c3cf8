#[tokio::main]
async fn main() -> anyhow::Result<()> {
    taskrelay_cli::cli::run().await
}
