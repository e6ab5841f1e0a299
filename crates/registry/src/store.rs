use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::{info, warn};

use common::{
    CandidateStatus, OverallStatus, RegistryError, StrategyCandidate, ValidationVerdict,
};

/// How many times a conflicting verdict append is retried before the
/// conflict is surfaced to the caller.
const WRITE_RETRIES: u32 = 3;

/// SQLite-backed strategy store.
///
/// Verdicts are append-only: rows are inserted, never updated or deleted,
/// so any historical win/loss table can be reconstructed later. Appends go
/// through a single writer and run inside one transaction together with the
/// candidate status update — the status column never disagrees with the
/// latest verdict row.
pub struct Registry {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl Registry {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    /// Apply schema migrations. Call once at startup (and in tests).
    pub async fn migrate(pool: &SqlitePool) -> Result<(), RegistryError> {
        sqlx::migrate!("../../migrations")
            .run(pool)
            .await
            .map_err(|e| RegistryError::Database(sqlx::Error::Migrate(Box::new(e))))
    }

    /// Insert a discovered candidate. Re-inserting an existing id is a no-op.
    pub async fn insert_candidate(
        &self,
        candidate: &StrategyCandidate,
    ) -> Result<(), RegistryError> {
        let rule = serde_json::to_string(&candidate.rule)
            .map_err(|e| RegistryError::Decode(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO candidates (id, name, source, rule, discovered_at, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&candidate.id)
        .bind(&candidate.name)
        .bind(candidate.source)
        .bind(rule)
        .bind(candidate.discovered_at.to_rfc3339())
        .bind(candidate.status)
        .execute(&self.pool)
        .await?;

        info!(id = %candidate.id, name = %candidate.name, "candidate registered");
        Ok(())
    }

    /// Fetch one candidate by id.
    pub async fn candidate(&self, id: &str) -> Result<StrategyCandidate, RegistryError> {
        let row = sqlx::query("SELECT * FROM candidates WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RegistryError::CandidateNotFound(id.to_string()))?;
        decode_candidate(&row)
    }

    /// All candidates currently in `status`, oldest first.
    pub async fn candidates_by_status(
        &self,
        status: CandidateStatus,
    ) -> Result<Vec<StrategyCandidate>, RegistryError> {
        let rows = sqlx::query(
            "SELECT * FROM candidates WHERE status = ?1 ORDER BY discovered_at",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_candidate).collect()
    }

    /// Append a verdict and move the candidate's status accordingly, in one
    /// transaction. Conflicting writes are retried whole; a verdict and its
    /// status update are never applied partially.
    pub async fn append_verdict(&self, verdict: &ValidationVerdict) -> Result<(), RegistryError> {
        let _writer = self.write_lock.lock().await;

        let windows = serde_json::to_string(&verdict.windows)
            .map_err(|e| RegistryError::Decode(e.to_string()))?;
        let sentiment = verdict
            .sentiment
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RegistryError::Decode(e.to_string()))?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_append(verdict, &windows, sentiment.as_deref()).await {
                Ok(()) => {
                    info!(
                        strategy = %verdict.strategy_id,
                        overall = %verdict.overall,
                        "verdict appended"
                    );
                    return Ok(());
                }
                Err(e) if is_busy(&e) && attempt < WRITE_RETRIES => {
                    warn!(
                        strategy = %verdict.strategy_id,
                        attempt,
                        "verdict append hit a busy database, retrying"
                    );
                }
                Err(e) if is_busy(&e) => return Err(RegistryError::WriteConflict),
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn try_append(
        &self,
        verdict: &ValidationVerdict,
        windows: &str,
        sentiment: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO verdicts (strategy_id, overall, windows, sentiment, evaluated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&verdict.strategy_id)
        .bind(verdict.overall)
        .bind(windows)
        .bind(sentiment)
        .bind(verdict.evaluated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE candidates SET status = ?1 WHERE id = ?2")
            .bind(status_for(verdict.overall))
            .bind(&verdict.strategy_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    /// Full verdict history for one strategy, oldest first.
    pub async fn verdict_history(
        &self,
        strategy_id: &str,
    ) -> Result<Vec<ValidationVerdict>, RegistryError> {
        let rows = sqlx::query(
            "SELECT * FROM verdicts WHERE strategy_id = ?1 ORDER BY seq",
        )
        .bind(strategy_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_verdict).collect()
    }
}

fn status_for(overall: OverallStatus) -> CandidateStatus {
    match overall {
        OverallStatus::Validated => CandidateStatus::Validated,
        OverallStatus::Rejected => CandidateStatus::Rejected,
        OverallStatus::InsufficientlyEvaluated => CandidateStatus::InsufficientlyEvaluated,
    }
}

fn is_busy(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            let msg = db.message().to_lowercase();
            msg.contains("locked") || msg.contains("busy")
        }
        _ => false,
    }
}

fn decode_candidate(row: &SqliteRow) -> Result<StrategyCandidate, RegistryError> {
    let rule_json: String = row.try_get("rule")?;
    let discovered_at: String = row.try_get("discovered_at")?;
    Ok(StrategyCandidate {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        source: row.try_get("source")?,
        rule: serde_json::from_str(&rule_json)
            .map_err(|e| RegistryError::Decode(format!("rule column: {e}")))?,
        discovered_at: parse_ts(&discovered_at)?,
        status: row.try_get("status")?,
    })
}

fn decode_verdict(row: &SqliteRow) -> Result<ValidationVerdict, RegistryError> {
    let windows_json: String = row.try_get("windows")?;
    let sentiment_json: Option<String> = row.try_get("sentiment")?;
    let evaluated_at: String = row.try_get("evaluated_at")?;
    Ok(ValidationVerdict {
        strategy_id: row.try_get("strategy_id")?,
        windows: serde_json::from_str(&windows_json)
            .map_err(|e| RegistryError::Decode(format!("windows column: {e}")))?,
        sentiment: sentiment_json
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| RegistryError::Decode(format!("sentiment column: {e}")))?,
        overall: row.try_get("overall")?,
        evaluated_at: parse_ts(&evaluated_at)?,
    })
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, RegistryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RegistryError::Decode(format!("timestamp '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::BTreeMap;

    use common::{
        Direction, Granularity, Indicator, SignalRule, Source, Threshold, WindowOutcome,
    };

    async fn memory_registry() -> Registry {
        // One connection, or every pool checkout would see its own
        // private in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Registry::migrate(&pool).await.unwrap();
        Registry::new(pool)
    }

    fn candidate() -> StrategyCandidate {
        StrategyCandidate::new(
            "rsi dip buyer",
            Source::Reddit,
            SignalRule::IndicatorThreshold {
                indicator: Indicator::Rsi { period: 14 },
                entry: Threshold::below(30.0),
                exit: Threshold::above(50.0),
                direction: Direction::Long,
            },
        )
    }

    fn verdict_for(id: &str, overall: OverallStatus) -> ValidationVerdict {
        let mut windows = BTreeMap::new();
        windows.insert(
            Granularity::Min15,
            WindowOutcome::NotEvaluated {
                reason: "provider unavailable".into(),
            },
        );
        ValidationVerdict {
            strategy_id: id.to_string(),
            windows,
            sentiment: None,
            overall,
            evaluated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn candidate_round_trips_through_the_store() {
        let registry = memory_registry().await;
        let original = candidate();
        registry.insert_candidate(&original).await.unwrap();

        let loaded = registry.candidate(&original.id).await.unwrap();
        assert_eq!(loaded.name, original.name);
        assert_eq!(loaded.rule, original.rule);
        assert_eq!(loaded.status, CandidateStatus::Pending);
    }

    #[tokio::test]
    async fn reinserting_an_existing_id_changes_nothing() {
        let registry = memory_registry().await;
        let original = candidate();
        registry.insert_candidate(&original).await.unwrap();

        let mut renamed = original.clone();
        renamed.name = "someone else's name".into();
        registry.insert_candidate(&renamed).await.unwrap();

        let loaded = registry.candidate(&original.id).await.unwrap();
        assert_eq!(loaded.name, original.name);
    }

    #[tokio::test]
    async fn missing_candidate_is_a_typed_error() {
        let registry = memory_registry().await;
        let err = registry.candidate("nope").await.unwrap_err();
        assert!(matches!(err, RegistryError::CandidateNotFound(_)));
    }

    #[tokio::test]
    async fn append_keeps_history_and_moves_status() {
        let registry = memory_registry().await;
        let c = candidate();
        registry.insert_candidate(&c).await.unwrap();

        registry
            .append_verdict(&verdict_for(&c.id, OverallStatus::Rejected))
            .await
            .unwrap();
        registry
            .append_verdict(&verdict_for(&c.id, OverallStatus::Validated))
            .await
            .unwrap();

        let history = registry.verdict_history(&c.id).await.unwrap();
        assert_eq!(history.len(), 2, "history must append, never overwrite");
        assert_eq!(history[0].overall, OverallStatus::Rejected);
        assert_eq!(history[1].overall, OverallStatus::Validated);

        let loaded = registry.candidate(&c.id).await.unwrap();
        assert_eq!(loaded.status, CandidateStatus::Validated);
    }

    #[tokio::test]
    async fn status_filter_returns_only_matching_candidates() {
        let registry = memory_registry().await;
        let pending = candidate();
        let judged = candidate();
        registry.insert_candidate(&pending).await.unwrap();
        registry.insert_candidate(&judged).await.unwrap();
        registry
            .append_verdict(&verdict_for(&judged.id, OverallStatus::Rejected))
            .await
            .unwrap();

        let still_pending = registry
            .candidates_by_status(CandidateStatus::Pending)
            .await
            .unwrap();
        assert_eq!(still_pending.len(), 1);
        assert_eq!(still_pending[0].id, pending.id);
    }

    #[tokio::test]
    async fn history_survives_reopening_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("radar.db").display()
        );

        let c = candidate();
        {
            let pool = SqlitePool::connect(&url).await.unwrap();
            Registry::migrate(&pool).await.unwrap();
            let registry = Registry::new(pool);
            registry.insert_candidate(&c).await.unwrap();
            registry
                .append_verdict(&verdict_for(&c.id, OverallStatus::Validated))
                .await
                .unwrap();
        }

        let pool = SqlitePool::connect(&url).await.unwrap();
        Registry::migrate(&pool).await.unwrap();
        let registry = Registry::new(pool);
        let history = registry.verdict_history(&c.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            registry.candidate(&c.id).await.unwrap().status,
            CandidateStatus::Validated
        );
    }
}
