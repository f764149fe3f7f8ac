//! API Handlers
//!
//! HTTP request handlers and the shared application state.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use tracing::info;

use crate::cache::{LruCache, SweepCache, TimedCache};
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::models::{HealthResponse, InvalidateResponse, SessionCounts, StatsResponse};
use crate::ratelimit::RateLimiter;
use crate::session::{ButtonRegistry, ResponseRegistry};
use crate::tasks::Scheduler;
use crate::upstream::GuardedUpstream;

/// Explicitly constructed components shared by the bot and the admin API.
#[derive(Clone)]
pub struct AppState {
    /// Memoized upstream responses, swept by age
    pub api_cache: SweepCache<String, Value>,
    /// Access-ordered lookup cache
    pub lookup_cache: LruCache<String, Value>,
    /// Pacing for the upstream behind `api_cache`
    pub limiter: Arc<RateLimiter>,
    /// Handlers awaiting a typed reply
    pub responses: ResponseRegistry,
    /// Handlers attached to message controls
    pub buttons: ButtonRegistry,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_cache: SweepCache::from_config(&config.cache),
            lookup_cache: TimedCache::with_capacity(config.lru_max_records),
            limiter: Arc::new(RateLimiter::from_config("upstream", &config.limiter)),
            responses: ResponseRegistry::new("responses"),
            buttons: ButtonRegistry::new("buttons"),
        }
    }

    /// Rate-limited, memoized access to the upstream behind `api_cache`.
    pub fn upstream(&self) -> GuardedUpstream<String, Value> {
        GuardedUpstream::new(self.api_cache.clone(), Arc::clone(&self.limiter))
    }

    /// Registers every periodic sweep with the shared scheduler.
    pub async fn register_sweeps(&self, scheduler: &Scheduler, config: &Config) {
        scheduler
            .register(
                "api-cache-sweep",
                config.cache.sweep_interval,
                self.api_cache.sweep_task(),
            )
            .await;
        scheduler
            .register(
                "response-reap",
                config.session.sweep_interval,
                self.responses.reap_task(),
            )
            .await;
        scheduler
            .register(
                "button-reap",
                config.session.sweep_interval,
                self.buttons.reap_task(),
            )
            .await;
    }
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        api_cache: state.api_cache.stats().await.into(),
        lookup_cache: state.lookup_cache.stats().await.into(),
        limiter: state.limiter.snapshot().await,
        sessions: SessionCounts {
            responses: state.responses.len().await,
            buttons: state.buttons.len().await,
        },
    })
}

/// Handler for DELETE /cache/:key
///
/// Drops the key from both caches; 404 if neither held it.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    let from_api = state.api_cache.delete(&key).await;
    let from_lookup = state.lookup_cache.delete(&key).await;

    if !from_api && !from_lookup {
        return Err(ApiError::NotFound(format!("Key '{}' is not cached", key)));
    }

    info!(%key, "Cache entry invalidated");
    Ok(Json(InvalidateResponse::new(key)))
}
