#[tokio::main]
async fn main() -> anyhow::Result<()> {
    uiscript_cli::cli::app::run().await
}
