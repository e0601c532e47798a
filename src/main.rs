/// lewalink - account and session service
use lewalink::{error::AppResult, server, AppContext, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> AppResult<()> {
    let config = ServerConfig::from_env()?;

    tracing_subscriber::registry()
        .with(config.logging.env_filter()?)
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    tracing::info!(
        level = %config.logging.level,
        max_admins = config.quotas.max_admins,
        max_editors = config.quotas.max_editors,
        email = config.email.is_some(),
        google = config.oauth.is_some(),
        "configuration loaded"
    );

    let ctx = AppContext::new(config).await?;

    server::serve(ctx).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    __                       ___       __
   / /   ___ _      ______ _/ (_)___  / /__
  / /   / _ \ | /| / / __ `/ / / __ \/ //_/
 / /___/  __/ |/ |/ / /_/ / / / / / / ,<
/_____/\___/|__/|__/\__,_/_/_/_/ /_/_/|_|

        Account service v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
