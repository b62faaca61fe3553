use anyhow::Context;
use halaqa::{scripture::ScriptureClient, social::Social, store::Store, telemetry, AppState, Config};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("reading configuration")?;
    telemetry::init(&config);

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::days(1)));

    let store = Store::connect(&config.database_url)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;
    let social = Social::start(store, &config);
    if config.seed_demo {
        social.seed_demo().await.context("seeding demo circle")?;
    }

    let app_state = AppState {
        social: social.clone(),
        scripture: ScriptureClient::new(config.scripture_api_base.as_str()),
    };

    let app = halaqa::router()
        .with_state(app_state)
        .layer(session_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    social.shutdown();
    Ok(())
}
