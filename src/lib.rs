pub mod api;
pub mod config;
pub mod db;
pub mod middleware;
pub mod server;
pub mod service;
pub mod util;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use db::UserRepo;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Database error: {0}")]
    Database(#[from] db::DbError),
    #[error("Server error: {0}")]
    Server(String),
}

/// Insert or refresh the users listed in the config file.
pub async fn seed_users(repo: &db::SqliteRepository, users: &[config::UserConfig]) -> Result<(), ServerError> {
    for user in users {
        let id = match user.id {
            Some(ref id) => uuid::Uuid::parse_str(id)
                .map_err(|e| ServerError::Server(format!("Invalid id for user {}: {}", user.username, e)))?
                .to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        repo.upsert_user(&db::User {
            id,
            username: user.username.clone(),
            password: user.password.clone(),
            admin: user.admin,
            trustedmember: user.trusted_member,
            created: Some(chrono::Utc::now().to_rfc3339()),
        })
        .await?;
        info!(username = %user.username, admin = user.admin, trusted_member = user.trusted_member, "seeded user");
    }
    Ok(())
}

pub async fn run(config_path: &str, debug_logs: bool) -> Result<(), ServerError> {
    let config = config::Config::from_file(config_path)?;

    info!("Using config file: {}", config_path);
    if debug_logs {
        info!("Debug logging enabled");
    }

    let db_path = config
        .get_database_path()
        .ok_or_else(|| ServerError::Server("No database path configured".to_string()))?;

    info!("Opening database at {}", db_path);
    let db = Arc::new(db::SqliteRepository::new(&db_path).await?);

    seed_users(&db, &config.users).await?;
    db.clone().start_background_tasks();

    let address = config.listen.address.as_deref().unwrap_or("[::]");
    let port = &config.listen.port;
    let addr: SocketAddr = format!("{}:{}", address, port)
        .parse()
        .map_err(|e| ServerError::Server(format!("Invalid address: {}", e)))?;

    let tls = match (&config.listen.tlscert, &config.listen.tlskey) {
        (Some(cert), Some(key)) => Some((cert.clone(), key.clone())),
        _ => None,
    };

    let state = server::AppState::new(config, db);
    let app = server::build_router(state);

    if let Some((cert_path, key_path)) = tls {
        info!("Loading TLS certificate from {}", cert_path);
        info!("Loading TLS key from {}", key_path);

        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(&cert_path, &key_path)
            .await
            .map_err(|e| ServerError::Server(format!("Failed to load TLS config: {}", e)))?;

        info!("Serving HTTPS on {}", addr);

        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await
            .map_err(|e| ServerError::Server(format!("Server error: {}", e)))?;
    } else {
        info!("Serving HTTP on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Server(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Server(format!("Server error: {}", e)))?;
    }

    Ok(())
}
