//! HTTP API Server
//!
//! Read-only view of the failover status for operators and health checks.

use std::sync::Arc;
use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::backup::{BackupManager, BackupStatus, StatusChange};
use crate::config::ApiConfig;
use crate::error::{Error, Result};

/// Shared application state
pub struct AppState {
    /// Node ID
    pub node_id: String,
    /// Failover state machine
    pub manager: Arc<BackupManager>,
    /// Most recent status transition
    pub last_change: RwLock<Option<StatusChange>>,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, node_id: String, manager: Arc<BackupManager>) -> Self {
        let state = Arc::new(AppState {
            node_id,
            manager,
            last_change: RwLock::new(None),
        });

        Self { config, state }
    }

    /// Get the state for sharing with other components
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Create the router
    pub fn create_router(state: Arc<AppState>, cors_enabled: bool) -> Router {
        let router = Router::new()
            .route("/status", get(handle_status))
            .route("/health", get(handle_health))
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        if cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        self.track_changes();

        let app = Self::create_router(Arc::clone(&self.state), self.config.cors_enabled);

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }

    /// Keep `last_change` current
    fn track_changes(&self) {
        let state = Arc::clone(&self.state);
        let mut changes = state.manager.subscribe();

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        *state.last_change.write().await = Some(change);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("Status API missed {} status change(s)", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

// ============ Response Types ============

/// Status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub node_id: String,
    pub status: BackupStatus,
    pub is_active: bool,
    pub priority: i32,
    pub port: u16,
    pub members: Vec<String>,
    pub keepalive_timeout_ms: u64,
    pub ms_since_last_keepalive: u64,
    pub last_change: Option<LastChange>,
}

/// Most recent transition, as reported by the API
#[derive(Debug, Serialize, Deserialize)]
pub struct LastChange {
    pub from: BackupStatus,
    pub to: BackupStatus,
    pub at: chrono::DateTime<chrono::Utc>,
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub node_id: String,
    pub status: BackupStatus,
}

// ============ Handlers ============

async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let manager = &state.manager;
    let last_change = state.last_change.read().await.as_ref().map(|c| LastChange {
        from: c.from,
        to: c.to,
        at: c.at,
    });

    Json(StatusResponse {
        node_id: state.node_id.clone(),
        status: manager.status(),
        is_active: manager.is_active(),
        priority: manager.priority(),
        port: manager.members().port(),
        members: manager.members().iter().map(str::to_string).collect(),
        keepalive_timeout_ms: manager.keepalive_timeout().as_millis() as u64,
        ms_since_last_keepalive: manager.since_last_keepalive().as_millis() as u64,
        last_change,
    })
}

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        node_id: state.node_id.clone(),
        status: state.manager.status(),
    })
}
