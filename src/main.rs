use axum::Router;
use tokio::net::TcpListener;

use anyhow::anyhow;

use switchboard::{ServerConfig, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;
    let address = config.address();
    println!("Starting server on {address}");

    // Create application state and start background sweepers
    let app_state = AppState::new(config).await;
    app_state.spawn_maintenance_tasks();

    // Webhook routes called by the telephony provider (no auth middleware;
    // the provider authenticates via its own signed requests)
    let webhook_routes = routes::webhooks::create_webhook_router();

    // Public health check route
    let public_routes = Router::new().route(
        "/",
        axum::routing::get(switchboard::handlers::api::health_check),
    );

    let app = public_routes.merge(webhook_routes).with_state(app_state);

    // Create listener
    let listener = TcpListener::bind(&address).await?;

    println!("Server listening on {address}");

    // Start server
    axum::serve(listener, app).await?;

    Ok(())
}
