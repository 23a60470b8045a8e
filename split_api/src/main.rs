mod config;
mod error;
mod routes;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = vs_app::create_app_context::<AppState, Config>().await?;

    let app = routes::router(state);

    vs_axum::run_app(app).await
}
