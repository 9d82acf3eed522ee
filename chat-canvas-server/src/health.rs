//! Health check endpoints for Kubernetes probes.
//!
//! - `/health/live` - Liveness probe (restart if fails)
//! - `/health/ready` - Readiness probe (remove from LB if fails)

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

/// Health status response.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// Overall status: "healthy" or "unhealthy"
    pub status: &'static str,
    /// Server version
    pub version: &'static str,
    /// Individual component checks
    pub checks: HealthChecks,
}

/// Individual health checks.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Session registry accessible
    pub session_registry: bool,
    /// Room for at least one more session
    pub session_capacity: bool,
    /// Live sessions
    pub sessions: usize,
}

/// Liveness probe - is the server running?
#[tracing::instrument(name = "liveness_probe")]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe - can the server take a new session?
#[tracing::instrument(name = "readiness_probe", skip(state))]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let registry_ok = state.sessions.is_healthy();
    let sessions = state.sessions.len();
    let capacity_ok = sessions < state.sessions.limits().max_sessions;

    let all_ok = registry_ok && capacity_ok;

    let status = HealthStatus {
        status: if all_ok { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION"),
        checks: HealthChecks {
            session_registry: registry_ok,
            session_capacity: capacity_ok,
            sessions,
        },
    };

    let code = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::sessions::{RegistryLimits, SessionRegistry};

    fn state_with_capacity(max_sessions: usize) -> AppState {
        let limits = RegistryLimits {
            max_sessions,
            ..RegistryLimits::default()
        };
        AppState::new(SessionRegistry::with_limits(limits), ServerConfig::default())
    }

    #[tokio::test]
    async fn test_readiness_healthy() {
        let (code, Json(status)) = readiness(State(state_with_capacity(2))).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(status.status, "healthy");
        assert_eq!(status.checks.sessions, 0);
    }

    #[tokio::test]
    async fn test_readiness_full_registry() {
        let state = state_with_capacity(1);
        state.sessions.create(None).expect("should create");
        let (code, Json(status)) = readiness(State(state)).await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!status.checks.session_capacity);
    }

    #[tokio::test]
    async fn test_readiness_poisoned_registry() {
        let state = state_with_capacity(4);
        let sessions = state.sessions.clone();
        let joined = std::thread::spawn(move || sessions.poison_for_test()).join();
        assert!(joined.is_err());

        let (code, Json(status)) = readiness(State(state)).await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!status.checks.session_registry);
        assert!(status.checks.session_capacity);
    }

    #[test]
    fn test_health_status_serialization() {
        let status = HealthStatus {
            status: "healthy",
            version: "0.1.0",
            checks: HealthChecks {
                session_registry: true,
                session_capacity: true,
                sessions: 3,
            },
        };

        let json = serde_json::to_string(&status).expect("should serialize");
        assert!(json.contains("healthy"));
        assert!(json.contains("session_registry"));
        assert!(json.contains("\"sessions\":3"));
    }
}
