use super::error::ProspectError;
use super::service::load_prospect;
use super::types::{LeadScoreHistoryEntry, LeadScoreUpdateRequest, Prospect};
use crate::shared::utils::DbPool;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Integer, Nullable, Text, Timestamptz, Uuid as SqlUuid};
use log::debug;
use uuid::Uuid;

pub const MIN_LEAD_SCORE: i32 = 0;
pub const MAX_LEAD_SCORE: i32 = 100;

/// Applies a score delta, keeping the result in the 0..=100 band.
pub fn apply_score_change(current: i32, change: i32) -> i32 {
    current.saturating_add(change).clamp(MIN_LEAD_SCORE, MAX_LEAD_SCORE)
}

/// Adjusts prospect lead scores and keeps the audit trail. Every change
/// writes a history row recording the actual delta after clamping.
pub struct LeadScoreTracker {
    conn: DbPool,
}

impl LeadScoreTracker {
    pub fn new(conn: DbPool) -> Self {
        Self { conn }
    }

    pub fn update_score(
        &self,
        prospect_id: Uuid,
        req: &LeadScoreUpdateRequest,
        changed_by: Option<Uuid>,
    ) -> Result<Prospect, ProspectError> {
        if req.reason.trim().is_empty() {
            return Err(ProspectError::InvalidInput(
                "A reason for the score change is required".to_string(),
            ));
        }

        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| ProspectError::DatabaseConnection)?;

        update_score_conn(
            &mut db_conn,
            prospect_id,
            req.score_change,
            &req.reason,
            req.activity_type.as_deref(),
            req.campaign_id,
            changed_by,
        )
    }

    pub fn get_history(
        &self,
        prospect_id: Uuid,
    ) -> Result<Vec<LeadScoreHistoryEntry>, ProspectError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| ProspectError::DatabaseConnection)?;

        // NotFound beats an empty history for a prospect that never existed.
        load_prospect(&mut db_conn, prospect_id)?;

        let rows: Vec<HistoryRow> = diesel::sql_query(
            "SELECT id, prospect_id, old_score, new_score, score_change, reason,
                    activity_type, campaign_id, changed_by, created_at
             FROM lead_score_history WHERE prospect_id = $1
             ORDER BY created_at DESC",
        )
        .bind::<SqlUuid, _>(prospect_id)
        .load(&mut db_conn)
        .map_err(|e| ProspectError::QueryFailed(e.to_string()))?;

        Ok(rows.into_iter().map(HistoryRow::into_entry).collect())
    }
}

/// Connection-level variant so the converter and engagement hooks can score
/// inside a wider transaction.
pub(super) fn update_score_conn(
    db_conn: &mut PgConnection,
    prospect_id: Uuid,
    score_change: i32,
    reason: &str,
    activity_type: Option<&str>,
    campaign_id: Option<Uuid>,
    changed_by: Option<Uuid>,
) -> Result<Prospect, ProspectError> {
    let prospect = load_prospect(db_conn, prospect_id)?;
    let old_score = prospect.lead_score;
    let new_score = apply_score_change(old_score, score_change);

    diesel::sql_query("UPDATE prospects SET lead_score = $2, updated_at = $3 WHERE id = $1")
        .bind::<SqlUuid, _>(prospect_id)
        .bind::<Integer, _>(new_score)
        .bind::<Timestamptz, _>(Utc::now())
        .execute(db_conn)
        .map_err(|e| ProspectError::QueryFailed(e.to_string()))?;

    record_history(
        db_conn,
        prospect_id,
        old_score,
        new_score,
        reason,
        activity_type,
        campaign_id,
        changed_by,
    )?;

    debug!("Prospect {prospect_id} lead score {old_score} -> {new_score} ({reason})");
    load_prospect(db_conn, prospect_id)
}

#[allow(clippy::too_many_arguments)]
pub(super) fn record_history(
    db_conn: &mut PgConnection,
    prospect_id: Uuid,
    old_score: i32,
    new_score: i32,
    reason: &str,
    activity_type: Option<&str>,
    campaign_id: Option<Uuid>,
    changed_by: Option<Uuid>,
) -> Result<(), ProspectError> {
    diesel::sql_query(
        "INSERT INTO lead_score_history
           (id, prospect_id, old_score, new_score, score_change, reason,
            activity_type, campaign_id, changed_by, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind::<SqlUuid, _>(Uuid::new_v4())
    .bind::<SqlUuid, _>(prospect_id)
    .bind::<Integer, _>(old_score)
    .bind::<Integer, _>(new_score)
    .bind::<Integer, _>(new_score - old_score)
    .bind::<Text, _>(reason)
    .bind::<Nullable<Text>, _>(activity_type)
    .bind::<Nullable<SqlUuid>, _>(campaign_id)
    .bind::<Nullable<SqlUuid>, _>(changed_by)
    .bind::<Timestamptz, _>(Utc::now())
    .execute(db_conn)
    .map_err(|e| ProspectError::QueryFailed(e.to_string()))?;
    Ok(())
}

#[derive(QueryableByName)]
struct HistoryRow {
    #[diesel(sql_type = SqlUuid)]
    id: Uuid,
    #[diesel(sql_type = SqlUuid)]
    prospect_id: Uuid,
    #[diesel(sql_type = Integer)]
    old_score: i32,
    #[diesel(sql_type = Integer)]
    new_score: i32,
    #[diesel(sql_type = Integer)]
    score_change: i32,
    #[diesel(sql_type = Text)]
    reason: String,
    #[diesel(sql_type = Nullable<Text>)]
    activity_type: Option<String>,
    #[diesel(sql_type = Nullable<SqlUuid>)]
    campaign_id: Option<Uuid>,
    #[diesel(sql_type = Nullable<SqlUuid>)]
    changed_by: Option<Uuid>,
    #[diesel(sql_type = Timestamptz)]
    created_at: DateTime<Utc>,
}

impl HistoryRow {
    fn into_entry(self) -> LeadScoreHistoryEntry {
        LeadScoreHistoryEntry {
            id: self.id,
            prospect_id: self.prospect_id,
            old_score: self.old_score,
            new_score: self.new_score,
            score_change: self.score_change,
            reason: self.reason,
            activity_type: self.activity_type,
            campaign_id: self.campaign_id,
            changed_by: self.changed_by,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_clamps_to_band() {
        assert_eq!(apply_score_change(95, 10), 100);
        assert_eq!(apply_score_change(5, -10), 0);
        assert_eq!(apply_score_change(50, 25), 75);
        assert_eq!(apply_score_change(0, 0), 0);
    }

    #[test]
    fn clamped_chain_loses_overflow() {
        // +60, +60, -30 from zero: the second bump is clamped at 100, so
        // the chain lands at 70, not 90.
        let mut score = 0;
        score = apply_score_change(score, 60);
        score = apply_score_change(score, 60);
        assert_eq!(score, 100);
        score = apply_score_change(score, -30);
        assert_eq!(score, 70);
    }
}
