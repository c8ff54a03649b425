/// User Management API server
///
/// Account registration, JWT login and admin account management over HTTP.
use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use user_management_api::{
    config::{LogFormat, ServerConfig},
    server, AppContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("failed to load configuration")?;

    init_tracing(&config.logging.filter, config.logging.format);

    print_banner();

    let ctx = AppContext::new(config)
        .await
        .context("failed to initialize application")?;

    server::serve(ctx).await.context("server failed")?;

    Ok(())
}

fn init_tracing(filter: &str, format: LogFormat) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn print_banner() {
    println!(
        r#"
  _   _                 __  __
 | | | |___ ___ _ _    |  \/  |__ _ _ _  __ _ __ _ ___ _ _
 | |_| (_-</ -_) '_|   | |\/| / _` | ' \/ _` / _` / -_) '_|
  \___//__/\___|_|     |_|  |_\__,_|_||_\__,_\__, \___|_|
                                             |___/
        User Management API v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
