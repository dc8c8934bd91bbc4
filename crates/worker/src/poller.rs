use advisor_core::domain::form::ClientFormRow;
use advisor_core::domain::recommendation::Recommendation;
use advisor_core::engine::AdvisorEngine;
use advisor_core::narrative::error::LlmDiagnosticsError;
use advisor_core::narrative::{NarrativeClient, NarrativeResponse, Provider};
use advisor_core::storage::client_forms::{self, FormCursor};
use advisor_core::storage::recommendations;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;

pub struct Poller {
    pub engine: AdvisorEngine,
    pub pool: sqlx::PgPool,
    pub narrator: Option<Box<dyn NarrativeClient>>,
    pub batch_size: i64,
    pub dry_run: bool,
}

impl Poller {
    /// Polls until Ctrl-C (or after one poll with `once`). Failures are logged and retried on the
    /// next tick; they never end the loop.
    pub async fn run(&self, mut cursor: FormCursor, interval: Duration, once: bool) {
        loop {
            cursor = self.poll(cursor).await;
            if once {
                break;
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!(%cursor, "shutdown signal received; stopping poller");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Processes one batch of new forms and returns the advanced cursor. The cursor stops before
    /// the first form whose outcome could not be stored, so the next tick picks it up again.
    async fn poll(&self, cursor: FormCursor) -> FormCursor {
        let rows = match client_forms::fetch_after(&self.pool, cursor, self.batch_size).await {
            Ok(rows) => rows,
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(%cursor, error = %err, "failed to fetch new client forms");
                return cursor;
            }
        };

        if rows.is_empty() {
            tracing::debug!(%cursor, "no new client forms");
            return cursor;
        }
        tracing::info!(%cursor, count = rows.len(), "processing new client forms");

        let mut outcomes = Vec::with_capacity(rows.len());
        for row in rows {
            let position = FormCursor::of(&row);
            let stored = self.process(row).await;
            outcomes.push((position, stored));
            if !stored {
                tracing::warn!(held_at = %position, "holding cursor until the form is stored");
                break;
            }
        }
        advance(cursor, outcomes)
    }

    /// Returns false when the outcome (recommendation or error row) was not stored.
    async fn process(&self, row: ClientFormRow) -> bool {
        let client_id = row.client_id.clone();
        let generated_at = Utc::now();
        let record = row.into_record();

        let recommendation = match self.engine.advise_at(&record, generated_at) {
            Ok(rec) => rec,
            Err(err) => {
                tracing::warn!(%client_id, error = %err, field = err.field(), "client form rejected");
                return self
                    .store_failure(&client_id, generated_at, &err.to_string(), None)
                    .await;
            }
        };

        let (narrative, raw_llm_response) = match self.narrate(&recommendation).await {
            Some(Ok(NarrativeResponse {
                narrative,
                raw_response_json,
            })) => (Some(narrative), Some(raw_response_json)),
            Some(Err(err)) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::warn!(%client_id, error = %err, "narrative failed; persisting without it");
                (None, raw_from_diagnostics(&err))
            }
            None => (None, None),
        };

        if self.dry_run {
            tracing::info!(
                %client_id,
                category = %recommendation.risk_profile.category,
                capital_deployable = recommendation.strategy.capital_deployable,
                narrative = narrative.is_some(),
                dry_run = true,
                "recommendation computed"
            );
            return true;
        }

        let provider = self
            .narrator
            .as_ref()
            .filter(|_| raw_llm_response.is_some())
            .map(|n| provider_name(n.provider()));
        match recommendations::persist_success(
            &self.pool,
            &recommendation,
            narrative.as_ref(),
            provider,
            raw_llm_response,
        )
        .await
        {
            Ok(id) => {
                tracing::info!(
                    %client_id,
                    recommendation_id = %id,
                    category = %recommendation.risk_profile.category,
                    "persisted recommendation"
                );
                true
            }
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(%client_id, error = %err, "failed to persist recommendation");
                false
            }
        }
    }

    async fn narrate(
        &self,
        recommendation: &Recommendation,
    ) -> Option<anyhow::Result<NarrativeResponse>> {
        let narrator = self.narrator.as_ref()?;
        Some(narrator.narrate(recommendation).await)
    }

    async fn store_failure(
        &self,
        client_id: &str,
        generated_at: DateTime<Utc>,
        error: &str,
        raw_llm_response: Option<Value>,
    ) -> bool {
        if self.dry_run {
            return true;
        }
        match recommendations::persist_failure(
            &self.pool,
            client_id,
            generated_at,
            error,
            raw_llm_response,
        )
        .await
        {
            Ok(_) => true,
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(%client_id, error = %err, "failed to persist error row");
                false
            }
        }
    }
}

/// Moves the cursor over stored forms, in order, up to the first one that was not stored.
fn advance(
    cursor: FormCursor,
    outcomes: impl IntoIterator<Item = (FormCursor, bool)>,
) -> FormCursor {
    outcomes
        .into_iter()
        .take_while(|(_, stored)| *stored)
        .fold(cursor, |next, (position, _)| next.max(position))
}

fn provider_name(provider: Provider) -> &'static str {
    match provider {
        Provider::Anthropic => "anthropic",
    }
}

fn raw_from_diagnostics(err: &anyhow::Error) -> Option<Value> {
    let diag = LlmDiagnosticsError::find(err)?;
    if let Some(json) = &diag.raw_response_json {
        return Some(json.clone());
    }
    let raw = diag.raw_output.as_deref()?;
    serde_json::from_str(raw)
        .ok()
        .or_else(|| Some(serde_json::json!({ "raw_text": raw })))
}
