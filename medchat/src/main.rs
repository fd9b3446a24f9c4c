use tracing::info;
use warp::Filter;

use medchat::{api, config, context, error, middleware};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so LOG_LEVEL can seed the filter
    let config = config::Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!("Starting medical chat service");
    info!(
        "Configuration loaded (retrieval backend: {})",
        config.retrieval.backend.as_str()
    );

    let ctx = context::AppContext::from_config(&config)?;

    let startup_status = ctx.backend.check_status().await;
    info!(
        "Knowledge base at startup: {} (ready = {})",
        startup_status.message, startup_status.ready
    );

    let routes = api::routes(ctx)
        .recover(error::handle_rejection)
        .with(warp::log("api"))
        .with(middleware::cors(&config.cors_origins));

    // Start server
    let addr = ([0, 0, 0, 0], config.port);
    info!("Server listening on {}", addr.1);

    warp::serve(routes).run(addr).await;

    Ok(())
}
