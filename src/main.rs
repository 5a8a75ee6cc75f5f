use std::net::SocketAddr;

use foodgram::{
    error::{Error, HtmlError, QueryError},
    handlers::Context,
    routes::routes,
    Cache, Config,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        log::error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Error> {
    let config = Config::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .map_err(QueryError::from)?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        log::error!("Migrations failed: {e}");
        HtmlError::InternalServerError.new("Migrations failed")
    })?;

    let cache = match &config.redis_url {
        Some(url) => Cache::connect(url).await.unwrap_or_else(|e| {
            log::warn!("Cache unavailable, continuing without it: {e}");
            Cache::disabled()
        }),
        None => Cache::disabled(),
    };

    let addr = SocketAddr::new(config.host, config.port);
    let api = routes(Context::new(pool, cache, config));

    let (addr, server) = warp::serve(api).bind_with_graceful_shutdown(addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for shutdown: {e}");
        }
    });
    log::info!("Listening on {addr}");
    server.await;

    log::info!("Shut down");
    Ok(())
}
