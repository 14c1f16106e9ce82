use axum::Router;
use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use ticketserver::categories::configure_categories_routes;
use ticketserver::config::AppConfig;
use ticketserver::locations::configure_locations_routes;
use ticketserver::notifications::{configure_devices_routes, PushSink};
use ticketserver::shared::state::AppState;
use ticketserver::shared::utils::create_conn;
use ticketserver::tickets::{configure_tickets_routes, sweep};
use ticketserver::users::configure_users_routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = AppConfig::from_env();
    if config.database_url.is_empty() {
        error!("DATABASE_URL is not set");
        anyhow::bail!("DATABASE_URL is not set");
    }

    let pool = create_conn(&config.database_url)?;

    let notifier = Arc::new(PushSink::new(
        pool.clone(),
        config.server.base_url.clone(),
        config.fcm.clone(),
        config.whatsapp.clone(),
    ));

    let state = Arc::new(AppState::new(pool, config.clone(), notifier));

    tokio::spawn(sweep::run_sla_sweep(state.clone()));

    let app = Router::new()
        .merge(configure_tickets_routes())
        .merge(configure_categories_routes())
        .merge(configure_locations_routes())
        .merge(configure_users_routes())
        .merge(configure_devices_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("ticketserver listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
