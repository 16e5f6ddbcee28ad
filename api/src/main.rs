mod config;
mod constants;
mod domain;
mod models;
mod routes;
mod services;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        HeaderName, HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::{self, ctrl_c};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use config::{Config, ConfigError};
use services::cloudinary::CloudinaryClient;
use services::db::{self, CaptureStore, PgCaptureStore};
use services::media::MediaUploader;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CaptureStore>,
    pub uploader: Arc<dyn MediaUploader>,
    pub upload_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to run migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
            Method::PATCH,
        ])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
            HeaderName::from_static("x-last-check"),
        ])
        .allow_credentials(true)
}

fn build_app(state: Arc<AppState>, config: &Config) -> Router {
    routes::build_routes()
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config))
        .with_state(state)
}

async fn run() -> Result<(), StartupError> {
    let config = Config::from_env()?;

    let pool = db::connect(&config.database_url, config.db_max_connections).await?;
    info!("Database connection pool created");

    db::run_migrations(&pool).await?;
    info!("Database migrations applied");

    let uploader = CloudinaryClient::new(&config.cloudinary);
    info!(cloud_name = %config.cloudinary.cloud_name, "Media uploader configured");

    let state = Arc::new(AppState {
        store: Arc::new(PgCaptureStore::new(pool)),
        uploader: Arc::new(uploader),
        upload_dir: config.upload_dir.clone(),
    });

    let app = build_app(state, &config);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running on port {}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "capture_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "Startup failed");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::db::memory::MemoryCaptureStore;
    use crate::services::media::fake::FakeUploader;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://localhost/captures".to_string()),
            "CLOUDINARY_CLOUD_NAME" | "CLOUDINARY_API_KEY" | "CLOUDINARY_API_SECRET" => {
                Some("x".to_string())
            }
            "ALLOWED_ORIGINS" => Some("http://localhost:5173".to_string()),
            "MAX_UPLOAD_BYTES" => Some("64".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            store: Arc::new(MemoryCaptureStore::new()),
            uploader: Arc::new(FakeUploader::new()),
            upload_dir: std::env::temp_dir().join("capture-api-main-tests"),
        })
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_configured_origin() {
        let config = test_config();
        let app = build_app(test_state(), &config);

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/capture")
            .header("Origin", "http://localhost:5173")
            .header("Access-Control-Request-Method", "POST")
            .header("Access-Control-Request-Headers", "content-type")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers["access-control-allow-origin"],
            "http://localhost:5173"
        );
        assert_eq!(headers["access-control-allow-credentials"], "true");
    }

    #[tokio::test]
    async fn test_body_limit_applied() {
        let config = test_config();
        let app = build_app(test_state(), &config);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/capture")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(format!(r#"{{"image":"{}"}}"#, "A".repeat(256))))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
