/// DocChase - WhatsApp document chasing for accountants
use anyhow::Context;
use docchase::{config::ServerConfig, context::AppContext, jobs, server};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so LOG_FORMAT can pick the formatter
    let config = ServerConfig::from_env().context("Failed to load configuration")?;

    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| "info".into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    print_banner();

    let ctx = AppContext::new(config)
        .await
        .context("Failed to initialise application context")?;
    let ctx = Arc::new(ctx);

    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    ____             ________
   / __ \____  _____/ ____/ /_  ____ _________
  / / / / __ \/ ___/ /   / __ \/ __ `/ ___/ _ \
 / /_/ / /_/ / /__/ /___/ / / / /_/ (__  )  __/
/_____/\____/\___/\____/_/ /_/\__,_/____/\___/

        Document chasing for accountants v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
