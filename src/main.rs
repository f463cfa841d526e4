use clap::Parser;

use impart_api::config::{AppConfig, ServerArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DB_DSN, CORS_TRUSTED_ORIGINS, etc.
    let _ = dotenvy::dotenv();

    let args = ServerArgs::parse();
    let config = AppConfig::load(&args);

    impart_api::init_tracing(&config.server.log_level);

    impart_api::run(config).await
}
