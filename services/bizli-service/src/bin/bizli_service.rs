use anyhow::Result;
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use bizli_service_api::{
    admin_routes, auth_routes, business_routes, client_routes, misc_routes, setup_tracing,
    stripe_routes, GlobalState,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    setup_tracing();

    let cors = CorsLayer::very_permissive();
    let trace = TraceLayer::new_for_http();

    let state = GlobalState::new().await?;

    let app = Router::new()
        .merge(auth_routes())
        .merge(client_routes(&state))
        .merge(business_routes(&state))
        .merge(admin_routes(&state))
        .merge(stripe_routes(&state))
        .merge(misc_routes())
        .layer(cors)
        .layer(trace)
        .with_state(state);

    let port: u16 = std::env::var("PORT")
        .unwrap_or("3033".into())
        .parse()
        .expect("failed to convert to number");

    let listener = tokio::net::TcpListener::bind(format!(":::{port}")).await?;

    tracing::info!("LISTENING ON {port}");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
