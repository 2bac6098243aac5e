use writeq_infra::config::AppConfig;
use writeq_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    writeq_observability::init(LogFormat::from_debug_flag(config.debug));

    tracing::info!(
        target_url = %config.target_url,
        state_path = %config.state_path.display(),
        "starting writeq"
    );

    writeq_api::server::run(config).await
}
