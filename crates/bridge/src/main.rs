mod bootstrap;
mod config;
mod orchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bootstrap::init_tracing();
    let config = config::Cli::load()?;
    orchestrator::Bridge::run(config).await
}
