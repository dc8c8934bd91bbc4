use crate::domain::form::ClientFormRow;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::fmt;

const FORM_COLUMNS: &str = "id, client_id, created_at, name, age, occupation, city, \
     monthly_salary, monthly_side_income, monthly_other_income, \
     monthly_bills, monthly_daily_life, monthly_entertainment, \
     monthly_savings, emergency_cash, risk_tolerance, financial_goals";

/// Keyset position in `client_forms`, ordered like Postgres compares `(created_at, id)` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FormCursor {
    pub created_at: DateTime<Utc>,
    pub id: i64,
}

impl FormCursor {
    /// Before every form.
    pub const START: Self = Self {
        created_at: DateTime::<Utc>::UNIX_EPOCH,
        id: 0,
    };

    /// After every form created at or before `created_at`.
    pub fn after_time(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            id: i64::MAX,
        }
    }

    pub fn of(row: &ClientFormRow) -> Self {
        Self {
            created_at: row.created_at,
            id: row.id,
        }
    }
}

impl fmt::Display for FormCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.created_at.to_rfc3339(), self.id)
    }
}

/// Position of the newest form, if any.
pub async fn latest_cursor(pool: &sqlx::PgPool) -> anyhow::Result<Option<FormCursor>> {
    let latest: Option<(DateTime<Utc>, i64)> = sqlx::query_as(
        "SELECT created_at, id FROM client_forms ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .persistent(false)
    .fetch_optional(pool)
    .await
    .context("select latest client_forms position failed")?;
    Ok(latest.map(|(created_at, id)| FormCursor { created_at, id }))
}

/// Forms strictly after `cursor` in `(created_at, id)` order, oldest first.
pub async fn fetch_after(
    pool: &sqlx::PgPool,
    cursor: FormCursor,
    limit: i64,
) -> anyhow::Result<Vec<ClientFormRow>> {
    let sql = format!(
        "SELECT {FORM_COLUMNS} FROM client_forms \
         WHERE (created_at, id) > ($1, $2) \
         ORDER BY created_at ASC, id ASC \
         LIMIT $3"
    );
    let rows = sqlx::query_as::<_, ClientFormRow>(&sql)
        .persistent(false)
        .bind(cursor.created_at)
        .bind(cursor.id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("select new client_forms failed")?;
    Ok(rows)
}

/// The most recent form submitted by a client.
pub async fn fetch_by_client_id(
    pool: &sqlx::PgPool,
    client_id: &str,
) -> anyhow::Result<Option<ClientFormRow>> {
    let sql = format!(
        "SELECT {FORM_COLUMNS} FROM client_forms WHERE client_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1"
    );
    let row = sqlx::query_as::<_, ClientFormRow>(&sql)
        .persistent(false)
        .bind(client_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("select client_forms for client_id={client_id} failed"))?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64, id: i64) -> FormCursor {
        FormCursor {
            created_at: Utc.timestamp_opt(1_770_000_000 + secs, 0).unwrap(),
            id,
        }
    }

    #[test]
    fn orders_by_time_then_id() {
        assert!(at(0, 2) > at(0, 1));
        assert!(at(1, 1) > at(0, 9));
        assert!(FormCursor::START < at(0, 1));
    }

    #[test]
    fn after_time_skips_every_form_at_that_instant() {
        let cursor = FormCursor::after_time(at(5, 0).created_at);
        assert!(cursor > at(5, 1_000_000));
        assert!(cursor < at(6, 1));
    }
}
