use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

// Session-scoped advisory lock. The connection holding it is kept out of the pool until release,
// so only one poller drains `client_forms` at a time.
const POLLER_LOCK_KEY: i64 = 0x4144_5649_534F; // "ADVISO"

pub struct PollerLock {
    conn: PoolConnection<Postgres>,
}

impl PollerLock {
    /// `None` when another session already holds the lock.
    pub async fn try_acquire(pool: &sqlx::PgPool) -> anyhow::Result<Option<Self>> {
        let mut conn = pool
            .acquire()
            .await
            .context("failed to acquire connection for poller lock")?;
        let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .persistent(false)
            .bind(POLLER_LOCK_KEY)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("failed to acquire advisory lock (key={POLLER_LOCK_KEY})"))?;
        Ok(acquired.0.then_some(Self { conn }))
    }

    pub async fn release(mut self) -> anyhow::Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(POLLER_LOCK_KEY)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("failed to release advisory lock (key={POLLER_LOCK_KEY})"))?;
        Ok(())
    }
}
