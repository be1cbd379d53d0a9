use furnimarket::{app, config::AppConfig, state::AppState, users::services::ensure_admin};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "furnimarket=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let (host, port) = (config.host.clone(), config.port);
    let bootstrap = config.bootstrap_admin.clone();

    let app_state = AppState::init(config).await?;

    if let Some(admin) = bootstrap {
        ensure_admin(app_state.store.as_ref(), &admin.email, &admin.password).await?;
    }

    let store = app_state.store.clone();
    let result = app::serve(app::build_app(app_state), &host, port).await;
    store.close().await;
    result
}
