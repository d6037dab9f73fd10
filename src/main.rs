use anyhow::Context;
use inflow::{
    cli::config_path_from_args, config::Config, logging::init_tracing, server,
    service::DecisionService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config_path_from_args()?;
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let _logging = init_tracing(&config.logging)?;

    let service = DecisionService::from_config(&config)
        .context("failed to construct decision service")?;
    server::run(service, &config.server.socket_path).await
}
