use music_grabber_backend::services::extractor::YtDlpExtractor;
use music_grabber_backend::{
    build_extractor, create_pool, create_router, run_migrations, AppConfig, AppState,
};

#[tokio::main]
async fn main() {
    // Environment first: .env feeds everything downstream.
    dotenvy::dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level)),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting music grabber backend"
    );

    // A real extractor binary is a hard requirement outside fake mode.
    if !config.extractor.search_fake && !config.extractor.download_fake {
        if let Err(err) = YtDlpExtractor::verify_available(&config.extractor).await {
            tracing::error!(error = %err, "extractor unavailable");
            std::process::exit(1);
        }
    }

    let pool = match create_pool(&config.database).await {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(error = %err, "database connection failed");
            std::process::exit(1);
        }
    };
    if let Err(err) = run_migrations(&pool).await {
        tracing::error!(error = %err, "migrations failed");
        std::process::exit(1);
    }

    if let Err(err) = tokio::fs::create_dir_all(&config.library.dir).await {
        tracing::error!(error = %err, dir = %config.library.dir.display(), "library directory unavailable");
        std::process::exit(1);
    }

    let extractor = build_extractor(&config.extractor);
    let state = AppState::build(config.clone(), pool, extractor);

    state.scheduler.start().await;
    let scheduler = state.scheduler.clone();

    let bind_address = config.server.bind_address();
    let listener = match tokio::net::TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, bind_address, "bind failed");
            std::process::exit(1);
        }
    };
    tracing::info!(bind_address, "listening");

    let router = create_router(state);
    let serve = axum::serve(listener, router).with_graceful_shutdown(shutdown_signal());
    if let Err(err) = serve.await {
        tracing::error!(error = %err, "server error");
    }

    // Shutdown awaits the scheduler so in-flight jobs reach a terminal
    // state before the process exits.
    scheduler.stop().await;
    tracing::info!("shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut term) = signal(SignalKind::terminate()) {
            term.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
