use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use advisor_core::config::Settings;
use advisor_core::domain::client::ClientRecord;
use advisor_core::domain::recommendation::Recommendation;
use advisor_core::engine::{AdvisorEngine, AdvisorError, PolicyConfig};
use advisor_core::storage::{client_forms, recommendations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let engine = AdvisorEngine::new(PolicyConfig::load(&settings)?)?;

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match advisor_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let app = router(AppState {
        engine: Arc::new(engine),
        pool,
    });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/advise", post(advise))
        .route("/analyze-portfolio/:client_id", post(analyze_portfolio))
        .route(
            "/recommendations/:client_id/latest",
            get(get_latest_recommendation),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    engine: Arc<AdvisorEngine>,
    pool: Option<PgPool>,
}

#[derive(Debug)]
enum ApiError {
    Invalid(AdvisorError),
    Status(StatusCode),
}

impl From<StatusCode> for ApiError {
    fn from(status: StatusCode) -> Self {
        Self::Status(status)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Invalid(err) => {
                let body = json!({ "error": err.to_string(), "field": err.field() });
                (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
            }
            Self::Status(status) => status.into_response(),
        }
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    sentry_anyhow::capture_anyhow(&err);
    tracing::error!(error = %err, "request failed");
    ApiError::Status(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn advise(
    State(state): State<AppState>,
    Json(record): Json<ClientRecord>,
) -> Result<Json<Recommendation>, ApiError> {
    let recommendation = state.engine.advise(&record).map_err(ApiError::Invalid)?;
    Ok(Json(recommendation))
}

#[derive(Debug, Serialize)]
struct ApiAnalysis {
    recommendation_id: Uuid,
    recommendation: Recommendation,
}

async fn analyze_portfolio(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<Json<ApiAnalysis>, ApiError> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE.into());
    };

    let row = client_forms::fetch_by_client_id(pool, &client_id)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;
    let record = row.into_record();

    let generated_at = chrono::Utc::now();
    let recommendation = match state.engine.advise_at(&record, generated_at) {
        Ok(rec) => rec,
        Err(err) => {
            if let Err(e) = recommendations::persist_failure(
                pool,
                &client_id,
                generated_at,
                &err.to_string(),
                None,
            )
            .await
            {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(%client_id, error = %e, "failed to persist error row");
            }
            return Err(ApiError::Invalid(err));
        }
    };

    let recommendation_id =
        recommendations::persist_success(pool, &recommendation, None, None, None)
            .await
            .map_err(internal)?;

    tracing::info!(%client_id, %recommendation_id, "portfolio analyzed");

    Ok(Json(ApiAnalysis {
        recommendation_id,
        recommendation,
    }))
}

async fn get_latest_recommendation(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<Json<recommendations::StoredRecommendation>, ApiError> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE.into());
    };

    let stored = recommendations::fetch_latest_for_client(pool, &client_id)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(stored))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        router(AppState {
            engine: Arc::new(AdvisorEngine::new(PolicyConfig::default()).unwrap()),
            pool: None,
        })
    }

    async fn send(req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let res = app().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn advise_returns_recommendation() {
        let (status, body) = send(post_json(
            "/advise",
            json!({
                "client_id": "c-1",
                "age": 35,
                "monthly_income": 5000,
                "monthly_expenses": 3000,
                "emergency_cash": 9000,
                "risk_tolerance": "moderate",
                "goals": [{"name": "retirement", "target_amount": 500000, "horizon_years": 30}]
            }),
        ))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["risk_profile"]["category"], json!("moderate"));
        assert_eq!(body["strategy"]["funding_notes"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn advise_names_the_invalid_field() {
        let (status, body) = send(post_json(
            "/advise",
            json!({
                "client_id": "c-1",
                "age": 35,
                "monthly_income": 5000,
                "monthly_expenses": 3000,
                "risk_tolerance": "unknown_value"
            }),
        ))
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["field"], json!("risk_tolerance"));
    }

    #[tokio::test]
    async fn negative_age_is_reported_by_field() {
        let (status, body) = send(post_json(
            "/advise",
            json!({
                "client_id": "c-1",
                "age": -3,
                "monthly_income": 5000,
                "monthly_expenses": 3000,
                "risk_tolerance": "moderate"
            }),
        ))
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["field"], json!("age"));
    }

    #[tokio::test]
    async fn database_routes_are_unavailable_without_a_pool() {
        let (status, _) = send(
            Request::get("/recommendations/c-1/latest")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = send(
            Request::post("/analyze-portfolio/c-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let res = app()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
