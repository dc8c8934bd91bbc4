use crate::domain::recommendation::{Narrative, Recommendation};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// A stored advisor run, success or failure, as returned to API callers.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StoredRecommendation {
    pub id: Uuid,
    pub client_id: String,
    pub generated_at: DateTime<Utc>,
    pub status: String,
    pub risk_category: Option<String>,
    pub metrics: Option<Value>,
    pub risk_profile: Option<Value>,
    pub goals: Option<Value>,
    pub strategy: Option<Value>,
    pub narrative: Option<Value>,
    pub provider: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn persist_success(
    pool: &sqlx::PgPool,
    recommendation: &Recommendation,
    narrative: Option<&Narrative>,
    provider: Option<&str>,
    raw_llm_response: Option<Value>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let metrics = to_json("metrics", &recommendation.metrics)?;
    let risk_profile = to_json("risk_profile", &recommendation.risk_profile)?;
    let goals = to_json("goals", &recommendation.goals)?;
    let strategy = to_json("strategy", &recommendation.strategy)?;
    let narrative = narrative.map(|n| to_json("narrative", n)).transpose()?;

    sqlx::query(
        "INSERT INTO advisor_recommendations \
         (id, client_id, generated_at, status, risk_category, metrics, risk_profile, goals, strategy, narrative, provider, raw_llm_response, error) \
         VALUES ($1, $2, $3, 'success', $4, $5, $6, $7, $8, $9, $10, $11, NULL)",
    )
    .persistent(false)
    .bind(id)
    .bind(&recommendation.client_id)
    .bind(recommendation.generated_at)
    .bind(recommendation.risk_profile.category.to_string())
    .bind(metrics)
    .bind(risk_profile)
    .bind(goals)
    .bind(strategy)
    .bind(narrative)
    .bind(provider)
    .bind(raw_llm_response)
    .execute(pool)
    .await
    .context("insert advisor_recommendations failed")?;

    Ok(id)
}

pub async fn persist_failure(
    pool: &sqlx::PgPool,
    client_id: &str,
    generated_at: DateTime<Utc>,
    error: &str,
    raw_llm_response: Option<Value>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO advisor_recommendations (id, client_id, generated_at, status, error, raw_llm_response) \
         VALUES ($1, $2, $3, 'error', $4, $5)",
    )
    .persistent(false)
    .bind(id)
    .bind(client_id)
    .bind(generated_at)
    .bind(error)
    .bind(raw_llm_response)
    .execute(pool)
    .await
    .context("insert error advisor_recommendations failed")?;

    Ok(id)
}

pub async fn fetch_latest_for_client(
    pool: &sqlx::PgPool,
    client_id: &str,
) -> anyhow::Result<Option<StoredRecommendation>> {
    let row = sqlx::query_as::<_, StoredRecommendation>(
        "SELECT id, client_id, generated_at, status, risk_category, metrics, risk_profile, goals, \
                strategy, narrative, provider, error, created_at \
         FROM advisor_recommendations \
         WHERE client_id = $1 \
         ORDER BY generated_at DESC, created_at DESC \
         LIMIT 1",
    )
    .persistent(false)
    .bind(client_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("select advisor_recommendations for client_id={client_id} failed"))?;
    Ok(row)
}

fn to_json<T: Serialize + ?Sized>(column: &str, value: &T) -> anyhow::Result<Value> {
    serde_json::to_value(value).with_context(|| format!("failed to serialize {column}"))
}
