use super::error::CampaignError;
use super::types::{EngagementRecord, EngagementStatus, Recipient};
use crate::shared::utils::DbPool;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{
    Integer, Nullable, Numeric, Text, Timestamptz, Uuid as SqlUuid,
};
use log::debug;
use uuid::Uuid;

pub(super) const ENGAGEMENT_COLUMNS: &str =
    "id, campaign_id, contact_id, prospect_id, status, sent_at, delivered_at, opened_at, \
     clicked_at, responded_at, converted_at, bounced_at, unsubscribed_at, open_count, \
     click_count, email_sent_to, email_message_id, email_subject, deal_id, conversion_value, \
     error_message, bounce_type, notes, created_at, updated_at";

#[derive(QueryableByName)]
pub(super) struct EngagementRow {
    #[diesel(sql_type = SqlUuid)]
    pub id: Uuid,
    #[diesel(sql_type = SqlUuid)]
    pub campaign_id: Uuid,
    #[diesel(sql_type = Nullable<SqlUuid>)]
    pub contact_id: Option<Uuid>,
    #[diesel(sql_type = Nullable<SqlUuid>)]
    pub prospect_id: Option<Uuid>,
    #[diesel(sql_type = Text)]
    pub status: String,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    pub sent_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    pub opened_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    pub clicked_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    pub responded_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    pub converted_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    pub bounced_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    pub unsubscribed_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Integer)]
    pub open_count: i32,
    #[diesel(sql_type = Integer)]
    pub click_count: i32,
    #[diesel(sql_type = Nullable<Text>)]
    pub email_sent_to: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub email_message_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub email_subject: Option<String>,
    #[diesel(sql_type = Nullable<SqlUuid>)]
    pub deal_id: Option<Uuid>,
    #[diesel(sql_type = Nullable<Numeric>)]
    pub conversion_value: Option<BigDecimal>,
    #[diesel(sql_type = Nullable<Text>)]
    pub error_message: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub bounce_type: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub notes: Option<String>,
    #[diesel(sql_type = Timestamptz)]
    pub created_at: DateTime<Utc>,
    #[diesel(sql_type = Timestamptz)]
    pub updated_at: DateTime<Utc>,
}

impl EngagementRow {
    pub(super) fn into_record(self) -> Result<EngagementRecord, CampaignError> {
        let status = self
            .status
            .parse::<EngagementStatus>()
            .map_err(CampaignError::QueryFailed)?;
        Ok(EngagementRecord {
            id: self.id,
            campaign_id: self.campaign_id,
            contact_id: self.contact_id,
            prospect_id: self.prospect_id,
            status,
            sent_at: self.sent_at,
            delivered_at: self.delivered_at,
            opened_at: self.opened_at,
            clicked_at: self.clicked_at,
            responded_at: self.responded_at,
            converted_at: self.converted_at,
            bounced_at: self.bounced_at,
            unsubscribed_at: self.unsubscribed_at,
            open_count: self.open_count,
            click_count: self.click_count,
            email_sent_to: self.email_sent_to,
            email_message_id: self.email_message_id,
            email_subject: self.email_subject,
            deal_id: self.deal_id,
            conversion_value: self.conversion_value,
            error_message: self.error_message,
            bounce_type: self.bounce_type,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl EngagementRecord {
    pub fn new(campaign_id: Uuid, recipient: Recipient) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            contact_id: recipient.contact_id(),
            prospect_id: recipient.prospect_id(),
            status: EngagementStatus::Pending,
            sent_at: None,
            delivered_at: None,
            opened_at: None,
            clicked_at: None,
            responded_at: None,
            converted_at: None,
            bounced_at: None,
            unsubscribed_at: None,
            open_count: 0,
            click_count: 0,
            email_sent_to: None,
            email_message_id: None,
            email_subject: None,
            deal_id: None,
            conversion_value: None,
            error_message: None,
            bounce_type: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn recipient(&self) -> Option<Recipient> {
        match (self.contact_id, self.prospect_id) {
            (Some(id), None) => Some(Recipient::Contact(id)),
            (None, Some(id)) => Some(Recipient::Prospect(id)),
            _ => None,
        }
    }

    fn advance_to(&mut self, target: EngagementStatus) {
        if target.stage_rank() > self.status.stage_rank() {
            self.status = target;
        }
    }

    pub fn mark_sent(
        &mut self,
        now: DateTime<Utc>,
        to: &str,
        message_id: Option<&str>,
        subject: Option<&str>,
    ) {
        self.sent_at.get_or_insert(now);
        self.email_sent_to = Some(to.to_string());
        if let Some(mid) = message_id {
            self.email_message_id = Some(mid.to_string());
        }
        if let Some(subj) = subject {
            self.email_subject = Some(subj.to_string());
        }
        self.error_message = None;
        self.advance_to(EngagementStatus::Sent);
        self.updated_at = now;
    }

    pub fn mark_delivered(&mut self, now: DateTime<Utc>) {
        self.delivered_at.get_or_insert(now);
        self.advance_to(EngagementStatus::Delivered);
        self.updated_at = now;
    }

    /// Every open bumps the counter; the timestamp and status only move on
    /// the first one. A later open never demotes a clicked or responded
    /// record.
    pub fn mark_opened(&mut self, now: DateTime<Utc>) {
        self.opened_at.get_or_insert(now);
        self.open_count += 1;
        self.advance_to(EngagementStatus::Opened);
        self.updated_at = now;
    }

    pub fn mark_clicked(&mut self, now: DateTime<Utc>) {
        self.clicked_at.get_or_insert(now);
        self.click_count += 1;
        self.advance_to(EngagementStatus::Clicked);
        self.updated_at = now;
    }

    pub fn mark_responded(&mut self, now: DateTime<Utc>) {
        self.responded_at.get_or_insert(now);
        self.status = EngagementStatus::Responded;
        self.updated_at = now;
    }

    pub fn mark_converted(
        &mut self,
        now: DateTime<Utc>,
        deal_id: Option<Uuid>,
        conversion_value: Option<BigDecimal>,
    ) {
        self.converted_at.get_or_insert(now);
        if deal_id.is_some() {
            self.deal_id = deal_id;
        }
        if conversion_value.is_some() {
            self.conversion_value = conversion_value;
        }
        self.status = EngagementStatus::Converted;
        self.updated_at = now;
    }

    pub fn mark_bounced(&mut self, now: DateTime<Utc>, bounce_type: &str, error: Option<&str>) {
        self.bounced_at.get_or_insert(now);
        self.bounce_type = Some(bounce_type.to_string());
        if let Some(err) = error {
            self.error_message = Some(err.to_string());
        }
        self.status = EngagementStatus::Bounced;
        self.updated_at = now;
    }

    pub fn mark_unsubscribed(&mut self, now: DateTime<Utc>) {
        self.unsubscribed_at.get_or_insert(now);
        self.status = EngagementStatus::Unsubscribed;
        self.updated_at = now;
    }

    /// Puts the record back to a pristine pending state so the campaign
    /// can be re-sent to this recipient. Deal linkage survives a resend.
    pub fn reset_for_resend(&mut self, now: DateTime<Utc>) {
        self.status = EngagementStatus::Pending;
        self.sent_at = None;
        self.delivered_at = None;
        self.opened_at = None;
        self.clicked_at = None;
        self.responded_at = None;
        self.converted_at = None;
        self.bounced_at = None;
        self.unsubscribed_at = None;
        self.open_count = 0;
        self.click_count = 0;
        self.email_message_id = None;
        self.error_message = None;
        self.bounce_type = None;
        self.updated_at = now;
    }
}

/// Loads engagement records, applies lifecycle transitions, and writes the
/// mutated tracking fields back. All status logic lives on
/// [`EngagementRecord`]; this service only handles persistence.
pub struct EngagementTracker {
    conn: DbPool,
}

impl EngagementTracker {
    pub fn new(conn: DbPool) -> Self {
        Self { conn }
    }

    pub fn get(&self, engagement_id: Uuid) -> Result<EngagementRecord, CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;
        load_record(&mut db_conn, engagement_id)
    }

    pub fn find_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<EngagementRecord, CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        let row: EngagementRow = diesel::sql_query(format!(
            "SELECT {ENGAGEMENT_COLUMNS} FROM engagement_records WHERE email_message_id = $1"
        ))
        .bind::<Text, _>(message_id)
        .get_result(&mut db_conn)
        .map_err(|_| CampaignError::MemberNotFound)?;

        row.into_record()
    }

    /// All engagement records tracking one prospect, across campaigns.
    pub fn list_for_prospect(
        &self,
        prospect_id: Uuid,
    ) -> Result<Vec<EngagementRecord>, CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        let rows: Vec<EngagementRow> = diesel::sql_query(format!(
            "SELECT {ENGAGEMENT_COLUMNS} FROM engagement_records
             WHERE prospect_id = $1 ORDER BY created_at DESC"
        ))
        .bind::<SqlUuid, _>(prospect_id)
        .load(&mut db_conn)
        .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

        rows.into_iter().map(EngagementRow::into_record).collect()
    }

    pub fn record_delivered(&self, engagement_id: Uuid) -> Result<EngagementRecord, CampaignError> {
        self.apply(engagement_id, |rec, now| rec.mark_delivered(now))
    }

    pub fn record_open(&self, engagement_id: Uuid) -> Result<EngagementRecord, CampaignError> {
        self.apply(engagement_id, |rec, now| rec.mark_opened(now))
    }

    pub fn record_click(&self, engagement_id: Uuid) -> Result<EngagementRecord, CampaignError> {
        self.apply(engagement_id, |rec, now| rec.mark_clicked(now))
    }

    pub fn record_response(&self, engagement_id: Uuid) -> Result<EngagementRecord, CampaignError> {
        self.apply(engagement_id, |rec, now| rec.mark_responded(now))
    }

    pub fn record_conversion(
        &self,
        engagement_id: Uuid,
        deal_id: Option<Uuid>,
        conversion_value: Option<BigDecimal>,
    ) -> Result<EngagementRecord, CampaignError> {
        self.apply(engagement_id, |rec, now| {
            rec.mark_converted(now, deal_id, conversion_value)
        })
    }

    pub fn record_bounce(
        &self,
        engagement_id: Uuid,
        bounce_type: &str,
        error: Option<&str>,
    ) -> Result<EngagementRecord, CampaignError> {
        self.apply(engagement_id, |rec, now| {
            rec.mark_bounced(now, bounce_type, error)
        })
    }

    /// Ties a closed deal back to the engagement record for a prospect in
    /// this campaign, marking the record converted with the deal's value.
    pub fn link_deal(
        &self,
        campaign_id: Uuid,
        prospect_id: Uuid,
        deal_id: Uuid,
        conversion_value: BigDecimal,
    ) -> Result<EngagementRecord, CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        let row: EngagementRow = diesel::sql_query(format!(
            "SELECT {ENGAGEMENT_COLUMNS} FROM engagement_records
             WHERE campaign_id = $1 AND prospect_id = $2"
        ))
        .bind::<SqlUuid, _>(campaign_id)
        .bind::<SqlUuid, _>(prospect_id)
        .get_result(&mut db_conn)
        .map_err(|_| CampaignError::MemberNotFound)?;

        let mut record = row.into_record()?;
        record.mark_converted(Utc::now(), Some(deal_id), Some(conversion_value));
        persist_tracking_fields(&mut db_conn, &record)?;
        Ok(record)
    }

    pub fn record_unsubscribe(
        &self,
        engagement_id: Uuid,
    ) -> Result<EngagementRecord, CampaignError> {
        self.apply(engagement_id, |rec, now| rec.mark_unsubscribed(now))
    }

    fn apply<F>(&self, engagement_id: Uuid, transition: F) -> Result<EngagementRecord, CampaignError>
    where
        F: FnOnce(&mut EngagementRecord, DateTime<Utc>),
    {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        let mut record = load_record(&mut db_conn, engagement_id)?;
        transition(&mut record, Utc::now());
        persist_tracking_fields(&mut db_conn, &record)?;

        debug!(
            "Engagement {} now {} (opens={}, clicks={})",
            record.id, record.status, record.open_count, record.click_count
        );
        Ok(record)
    }
}

pub(super) fn load_record(
    db_conn: &mut PgConnection,
    engagement_id: Uuid,
) -> Result<EngagementRecord, CampaignError> {
    let row: EngagementRow = diesel::sql_query(format!(
        "SELECT {ENGAGEMENT_COLUMNS} FROM engagement_records WHERE id = $1"
    ))
    .bind::<SqlUuid, _>(engagement_id)
    .get_result(db_conn)
    .map_err(|_| CampaignError::MemberNotFound)?;

    row.into_record()
}

/// A record reached through a campaign-scoped route must actually belong to
/// that campaign; a mismatch is a bad request, not a missing record.
pub(super) fn ensure_member_of(
    record: &EngagementRecord,
    campaign_id: Uuid,
) -> Result<(), CampaignError> {
    if record.campaign_id != campaign_id {
        return Err(CampaignError::InvalidInput(format!(
            "Engagement record {} belongs to a different campaign",
            record.id
        )));
    }
    Ok(())
}

pub(super) fn persist_tracking_fields(
    db_conn: &mut PgConnection,
    record: &EngagementRecord,
) -> Result<(), CampaignError> {
    diesel::sql_query(
        r"UPDATE engagement_records SET
              status = $2,
              sent_at = $3,
              delivered_at = $4,
              opened_at = $5,
              clicked_at = $6,
              responded_at = $7,
              converted_at = $8,
              bounced_at = $9,
              unsubscribed_at = $10,
              open_count = $11,
              click_count = $12,
              email_sent_to = $13,
              email_message_id = $14,
              email_subject = $15,
              deal_id = $16,
              conversion_value = $17,
              error_message = $18,
              bounce_type = $19,
              updated_at = $20
          WHERE id = $1",
    )
    .bind::<SqlUuid, _>(record.id)
    .bind::<Text, _>(record.status.to_string())
    .bind::<Nullable<Timestamptz>, _>(record.sent_at)
    .bind::<Nullable<Timestamptz>, _>(record.delivered_at)
    .bind::<Nullable<Timestamptz>, _>(record.opened_at)
    .bind::<Nullable<Timestamptz>, _>(record.clicked_at)
    .bind::<Nullable<Timestamptz>, _>(record.responded_at)
    .bind::<Nullable<Timestamptz>, _>(record.converted_at)
    .bind::<Nullable<Timestamptz>, _>(record.bounced_at)
    .bind::<Nullable<Timestamptz>, _>(record.unsubscribed_at)
    .bind::<Integer, _>(record.open_count)
    .bind::<Integer, _>(record.click_count)
    .bind::<Nullable<Text>, _>(record.email_sent_to.as_deref())
    .bind::<Nullable<Text>, _>(record.email_message_id.as_deref())
    .bind::<Nullable<Text>, _>(record.email_subject.as_deref())
    .bind::<Nullable<SqlUuid>, _>(record.deal_id)
    .bind::<Nullable<Numeric>, _>(record.conversion_value.as_ref())
    .bind::<Nullable<Text>, _>(record.error_message.as_deref())
    .bind::<Nullable<Text>, _>(record.bounce_type.as_deref())
    .bind::<Timestamptz, _>(record.updated_at)
    .execute(db_conn)
    .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::FromPrimitive;

    fn fresh_record() -> EngagementRecord {
        EngagementRecord::new(Uuid::new_v4(), Recipient::Contact(Uuid::new_v4()))
    }

    #[test]
    fn first_open_sets_timestamp_later_opens_only_count() {
        let mut rec = fresh_record();
        let t1 = Utc::now();
        rec.mark_sent(t1, "a@example.com", Some("mid-1"), None);
        rec.mark_opened(t1);
        assert_eq!(rec.status, EngagementStatus::Opened);
        assert_eq!(rec.opened_at, Some(t1));
        assert_eq!(rec.open_count, 1);

        let t2 = t1 + chrono::Duration::minutes(5);
        rec.mark_opened(t2);
        assert_eq!(rec.opened_at, Some(t1));
        assert_eq!(rec.open_count, 2);
    }

    #[test]
    fn open_after_click_does_not_demote_status() {
        let mut rec = fresh_record();
        let now = Utc::now();
        rec.mark_sent(now, "a@example.com", None, None);
        rec.mark_clicked(now);
        assert_eq!(rec.status, EngagementStatus::Clicked);

        rec.mark_opened(now);
        assert_eq!(rec.status, EngagementStatus::Clicked);
        assert_eq!(rec.open_count, 1);
        assert_eq!(rec.click_count, 1);
    }

    #[test]
    fn bounce_overrides_forward_stages() {
        let mut rec = fresh_record();
        let now = Utc::now();
        rec.mark_sent(now, "a@example.com", None, None);
        rec.mark_bounced(now, "hard", Some("mailbox unavailable"));
        assert_eq!(rec.status, EngagementStatus::Bounced);
        assert_eq!(rec.bounce_type.as_deref(), Some("hard"));

        // A stray open arriving after the bounce must not revive the record.
        rec.mark_opened(now);
        assert_eq!(rec.status, EngagementStatus::Bounced);
        assert_eq!(rec.open_count, 1);
    }

    #[test]
    fn conversion_records_deal_and_value() {
        let mut rec = fresh_record();
        let now = Utc::now();
        let deal = Uuid::new_v4();
        rec.mark_converted(now, Some(deal), BigDecimal::from_f64(1250.0));
        assert_eq!(rec.status, EngagementStatus::Converted);
        assert_eq!(rec.deal_id, Some(deal));
        assert!(rec.conversion_value.is_some());
        assert_eq!(rec.converted_at, Some(now));
    }

    #[test]
    fn reset_clears_tracking_but_keeps_deal_linkage() {
        let mut rec = fresh_record();
        let now = Utc::now();
        let deal = Uuid::new_v4();
        rec.mark_sent(now, "a@example.com", Some("mid-1"), Some("Hello"));
        rec.mark_opened(now);
        rec.mark_converted(now, Some(deal), None);

        rec.reset_for_resend(now);
        assert_eq!(rec.status, EngagementStatus::Pending);
        assert!(rec.sent_at.is_none());
        assert!(rec.opened_at.is_none());
        assert!(rec.converted_at.is_none());
        assert_eq!(rec.open_count, 0);
        assert!(rec.email_message_id.is_none());
        assert_eq!(rec.deal_id, Some(deal));
        assert_eq!(rec.email_sent_to.as_deref(), Some("a@example.com"));
    }

    #[test]
    fn response_after_bounce_moves_status_but_keeps_bounce_timestamp() {
        let mut rec = fresh_record();
        let now = Utc::now();
        rec.mark_sent(now, "a@example.com", None, None);
        rec.mark_bounced(now, "soft", Some("greylisted"));
        rec.mark_responded(now);

        // Only the status decides which counter bucket the record lands in;
        // the bounce timestamp stays as history.
        assert_eq!(rec.status, EngagementStatus::Responded);
        assert!(rec.bounced_at.is_some());
        assert!(rec.responded_at.is_some());
    }

    #[test]
    fn member_check_rejects_foreign_campaign() {
        let campaign = Uuid::new_v4();
        let rec = EngagementRecord::new(campaign, Recipient::Contact(Uuid::new_v4()));
        assert!(ensure_member_of(&rec, campaign).is_ok());
        assert!(matches!(
            ensure_member_of(&rec, Uuid::new_v4()),
            Err(CampaignError::InvalidInput(_))
        ));
    }

    #[test]
    fn recipient_is_exclusive() {
        let contact = Uuid::new_v4();
        let rec = EngagementRecord::new(Uuid::new_v4(), Recipient::Contact(contact));
        assert_eq!(rec.contact_id, Some(contact));
        assert!(rec.prospect_id.is_none());
        assert_eq!(rec.recipient(), Some(Recipient::Contact(contact)));
    }
}
