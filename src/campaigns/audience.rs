use super::engagement::{ensure_member_of, load_record};
use super::error::CampaignError;
use super::types::{
    AddAudienceRequest, AddAudienceResponse, AddMemberRequest, AddMemberResponse,
    AudienceListResponse, AudienceMember, AudienceQuery, BulkAddResult, EngagementStatus,
    Recipient,
};
use crate::shared::utils::{page_offset, DbPool};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Nullable, Text, Timestamptz, Uuid as SqlUuid};
use log::info;
use uuid::Uuid;

/// Weight a member's engagement by how deep into the funnel they got,
/// then by raw interaction volume. Clicks count double.
pub fn engagement_score(status: EngagementStatus, open_count: i32, click_count: i32) -> i32 {
    let stage_weight = match status {
        EngagementStatus::Delivered => 1,
        EngagementStatus::Opened => 2,
        EngagementStatus::Clicked => 3,
        EngagementStatus::Responded => 5,
        EngagementStatus::Converted => 10,
        _ => 0,
    };
    stage_weight + open_count + click_count * 2
}

/// Manages which contacts and prospects belong to a campaign's audience.
/// Membership is one engagement record per (campaign, recipient); adding an
/// existing member is a no-op, never an error.
pub struct AudienceManager {
    conn: DbPool,
}

impl AudienceManager {
    pub fn new(conn: DbPool) -> Self {
        Self { conn }
    }

    pub fn add_audience(
        &self,
        campaign_id: Uuid,
        req: &AddAudienceRequest,
    ) -> Result<AddAudienceResponse, CampaignError> {
        if req.contact_ids.is_empty() && req.prospect_ids.is_empty() {
            return Err(CampaignError::InvalidInput(
                "No contacts or prospects provided".to_string(),
            ));
        }

        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        ensure_campaign_exists(&mut db_conn, campaign_id)?;

        let mut contacts = BulkAddResult::default();
        for &contact_id in &req.contact_ids {
            contacts.total_requested += 1;
            if insert_member(&mut db_conn, campaign_id, Recipient::Contact(contact_id), None)? {
                contacts.added_count += 1;
            } else {
                contacts.skipped_count += 1;
            }
        }

        let mut prospects = BulkAddResult::default();
        for &prospect_id in &req.prospect_ids {
            prospects.total_requested += 1;
            if insert_member(&mut db_conn, campaign_id, Recipient::Prospect(prospect_id), None)? {
                prospects.added_count += 1;
            } else {
                prospects.skipped_count += 1;
            }
        }

        let total = refresh_target_audience_size(&mut db_conn, campaign_id)?;

        info!(
            "Campaign {} audience: +{} contacts, +{} prospects, {} skipped, total {}",
            campaign_id,
            contacts.added_count,
            prospects.added_count,
            contacts.skipped_count + prospects.skipped_count,
            total
        );

        Ok(AddAudienceResponse {
            campaign_id,
            added_contacts: contacts.added_count,
            added_prospects: prospects.added_count,
            skipped_duplicates: contacts.skipped_count + prospects.skipped_count,
            total_audience: total,
            message: format!(
                "Added {} contacts and {} prospects to campaign",
                contacts.added_count, prospects.added_count
            ),
        })
    }

    /// Single add with an optional per-campaign send-to address. The stored
    /// address wins over the recipient's own email when the campaign sends.
    pub fn add_member(
        &self,
        campaign_id: Uuid,
        req: &AddMemberRequest,
    ) -> Result<AddMemberResponse, CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;
        ensure_campaign_exists(&mut db_conn, campaign_id)?;
        let added = insert_member(
            &mut db_conn,
            campaign_id,
            req.recipient,
            req.email.as_deref(),
        )?;
        let total = refresh_target_audience_size(&mut db_conn, campaign_id)?;
        Ok(AddMemberResponse {
            campaign_id,
            recipient: req.recipient,
            added,
            total_audience: total,
        })
    }

    pub fn remove_member(
        &self,
        campaign_id: Uuid,
        engagement_id: Uuid,
    ) -> Result<(), CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        let record = load_record(&mut db_conn, engagement_id)?;
        ensure_member_of(&record, campaign_id)?;

        diesel::sql_query("DELETE FROM engagement_records WHERE id = $1")
            .bind::<SqlUuid, _>(engagement_id)
            .execute(&mut db_conn)
            .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

        refresh_target_audience_size(&mut db_conn, campaign_id)?;
        Ok(())
    }

    pub fn list(
        &self,
        campaign_id: Uuid,
        query: &AudienceQuery,
    ) -> Result<AudienceListResponse, CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        ensure_campaign_exists(&mut db_conn, campaign_id)?;

        let where_clause = member_where_clause(query.status.as_deref())?;

        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(50).clamp(1, 200);
        let offset = page_offset(page, per_page);

        let rows: Vec<MemberRow> = diesel::sql_query(format!(
            r"SELECT e.id AS engagement_id, e.contact_id, e.prospect_id,
                     e.status, e.sent_at, e.opened_at, e.clicked_at,
                     e.responded_at, e.converted_at, e.open_count, e.click_count,
                     c.first_name AS contact_first_name, c.last_name AS contact_last_name,
                     c.email AS contact_email, co.name AS contact_company,
                     p.first_name AS prospect_first_name, p.last_name AS prospect_last_name,
                     p.email AS prospect_email, p.company AS prospect_company,
                     p.lead_score AS lead_score
              FROM engagement_records e
              LEFT JOIN contacts c ON c.id = e.contact_id
              LEFT JOIN companies co ON co.id = c.company_id
              LEFT JOIN prospects p ON p.id = e.prospect_id
              WHERE {where_clause}
              ORDER BY e.created_at ASC
              LIMIT $2 OFFSET $3"
        ))
        .bind::<SqlUuid, _>(campaign_id)
        .bind::<BigInt, _>(i64::from(per_page))
        .bind::<BigInt, _>(offset)
        .load(&mut db_conn)
        .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

        // The reported total honors the same status filter as the page.
        #[derive(QueryableByName)]
        struct CountRow {
            #[diesel(sql_type = BigInt)]
            n: i64,
        }
        let total = diesel::sql_query(format!(
            "SELECT COUNT(*) AS n FROM engagement_records e WHERE {where_clause}"
        ))
        .bind::<SqlUuid, _>(campaign_id)
        .get_result::<CountRow>(&mut db_conn)
        .map_err(|e| CampaignError::QueryFailed(e.to_string()))?
        .n;

        let audience = rows
            .into_iter()
            .filter_map(|row| row.into_member().transpose())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AudienceListResponse {
            campaign_id,
            audience,
            total,
        })
    }
}

fn parse_status_filter(raw: &str) -> Result<Vec<EngagementStatus>, CampaignError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<EngagementStatus>()
                .map_err(CampaignError::InvalidInput)
        })
        .collect()
}

/// WHERE clause shared by the page query and its count; $1 is always the
/// campaign id. Status values are validated through the enum before they
/// are inlined.
fn member_where_clause(status_filter: Option<&str>) -> Result<String, CampaignError> {
    let mut where_clause = String::from("e.campaign_id = $1");
    if let Some(raw) = status_filter {
        let statuses = parse_status_filter(raw)?;
        if !statuses.is_empty() {
            let quoted: Vec<String> = statuses.iter().map(|s| format!("'{s}'")).collect();
            where_clause.push_str(&format!(" AND e.status IN ({})", quoted.join(", ")));
        }
    }
    Ok(where_clause)
}

pub(super) fn ensure_campaign_exists(
    db_conn: &mut PgConnection,
    campaign_id: Uuid,
) -> Result<(), CampaignError> {
    #[derive(QueryableByName)]
    struct Exists {
        #[diesel(sql_type = BigInt)]
        n: i64,
    }

    let row: Exists = diesel::sql_query("SELECT COUNT(*) AS n FROM campaigns WHERE id = $1")
        .bind::<SqlUuid, _>(campaign_id)
        .get_result(db_conn)
        .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

    if row.n == 0 {
        return Err(CampaignError::NotFound);
    }
    Ok(())
}

fn insert_member(
    db_conn: &mut PgConnection,
    campaign_id: Uuid,
    recipient: Recipient,
    email_sent_to: Option<&str>,
) -> Result<bool, CampaignError> {
    let (table, column, recipient_id) = match recipient {
        Recipient::Contact(id) => ("contacts", "contact_id", id),
        Recipient::Prospect(id) => ("prospects", "prospect_id", id),
    };

    #[derive(QueryableByName)]
    struct Exists {
        #[diesel(sql_type = BigInt)]
        n: i64,
    }

    let exists: Exists =
        diesel::sql_query(format!("SELECT COUNT(*) AS n FROM {table} WHERE id = $1"))
            .bind::<SqlUuid, _>(recipient_id)
            .get_result(db_conn)
            .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;
    if exists.n == 0 {
        return Err(CampaignError::InvalidInput(format!(
            "No such recipient in {table}: {recipient_id}"
        )));
    }

    let inserted = diesel::sql_query(format!(
        "INSERT INTO engagement_records
             (id, campaign_id, {column}, email_sent_to, status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, 'pending', $5, $5)
         ON CONFLICT (campaign_id, {column}) WHERE {column} IS NOT NULL DO NOTHING"
    ))
    .bind::<SqlUuid, _>(Uuid::new_v4())
    .bind::<SqlUuid, _>(campaign_id)
    .bind::<SqlUuid, _>(recipient_id)
    .bind::<Nullable<Text>, _>(email_sent_to)
    .bind::<Timestamptz, _>(Utc::now())
    .execute(db_conn)
    .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

    Ok(inserted == 1)
}

fn count_members(db_conn: &mut PgConnection, campaign_id: Uuid) -> Result<i64, CampaignError> {
    #[derive(QueryableByName)]
    struct CountRow {
        #[diesel(sql_type = BigInt)]
        n: i64,
    }

    let row: CountRow =
        diesel::sql_query("SELECT COUNT(*) AS n FROM engagement_records WHERE campaign_id = $1")
            .bind::<SqlUuid, _>(campaign_id)
            .get_result(db_conn)
            .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;
    Ok(row.n)
}

/// The campaign's audience size is always the live membership count, never
/// a manually maintained number.
pub(super) fn refresh_target_audience_size(
    db_conn: &mut PgConnection,
    campaign_id: Uuid,
) -> Result<i64, CampaignError> {
    let total = count_members(db_conn, campaign_id)?;

    diesel::sql_query(
        "UPDATE campaigns SET target_audience_size = $2, updated_at = $3 WHERE id = $1",
    )
    .bind::<SqlUuid, _>(campaign_id)
    .bind::<Integer, _>(total as i32)
    .bind::<Timestamptz, _>(Utc::now())
    .execute(db_conn)
    .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

    Ok(total)
}

#[derive(QueryableByName)]
struct MemberRow {
    #[diesel(sql_type = SqlUuid)]
    engagement_id: Uuid,
    #[diesel(sql_type = Nullable<SqlUuid>)]
    contact_id: Option<Uuid>,
    #[diesel(sql_type = Nullable<SqlUuid>)]
    prospect_id: Option<Uuid>,
    #[diesel(sql_type = Text)]
    status: String,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    sent_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    opened_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    clicked_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    responded_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    converted_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Integer)]
    open_count: i32,
    #[diesel(sql_type = Integer)]
    click_count: i32,
    #[diesel(sql_type = Nullable<Text>)]
    contact_first_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    contact_last_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    contact_email: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    contact_company: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    prospect_first_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    prospect_last_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    prospect_email: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    prospect_company: Option<String>,
    #[diesel(sql_type = Nullable<Integer>)]
    lead_score: Option<i32>,
}

impl MemberRow {
    fn into_member(self) -> Result<Option<AudienceMember>, CampaignError> {
        let recipient = match (self.contact_id, self.prospect_id) {
            (Some(id), None) => Recipient::Contact(id),
            (None, Some(id)) => Recipient::Prospect(id),
            // Orphaned row whose recipient was deleted out from under us.
            _ => return Ok(None),
        };

        let status = self
            .status
            .parse::<EngagementStatus>()
            .map_err(CampaignError::QueryFailed)?;

        let (first, last, email, company) = match recipient {
            Recipient::Contact(_) => (
                self.contact_first_name,
                self.contact_last_name,
                self.contact_email,
                self.contact_company,
            ),
            Recipient::Prospect(_) => (
                self.prospect_first_name,
                self.prospect_last_name,
                self.prospect_email,
                self.prospect_company,
            ),
        };

        let name = match (first, last) {
            (Some(f), Some(l)) => format!("{f} {l}"),
            (Some(f), None) => f,
            (None, Some(l)) => l,
            (None, None) => String::new(),
        };

        Ok(Some(AudienceMember {
            engagement_id: self.engagement_id,
            recipient,
            name,
            email,
            company,
            status,
            sent_at: self.sent_at,
            opened_at: self.opened_at,
            clicked_at: self.clicked_at,
            responded_at: self.responded_at,
            converted_at: self.converted_at,
            open_count: self.open_count,
            click_count: self.click_count,
            engagement_score: engagement_score(status, self.open_count, self.click_count),
            lead_score: self.lead_score,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engagement_score_weights_clicks_double() {
        assert_eq!(engagement_score(EngagementStatus::Pending, 0, 0), 0);
        assert_eq!(engagement_score(EngagementStatus::Opened, 3, 0), 5);
        assert_eq!(engagement_score(EngagementStatus::Clicked, 3, 2), 10);
        assert_eq!(engagement_score(EngagementStatus::Converted, 1, 1), 13);
    }

    #[test]
    fn status_filter_rejects_unknown_values() {
        assert!(parse_status_filter("opened, clicked").is_ok());
        assert!(parse_status_filter("opened,bogus").is_err());
    }

    #[test]
    fn member_filter_applies_to_count_and_page_alike() {
        let clause = member_where_clause(Some("opened,clicked")).unwrap();
        assert_eq!(
            clause,
            "e.campaign_id = $1 AND e.status IN ('opened', 'clicked')"
        );
        assert_eq!(member_where_clause(None).unwrap(), "e.campaign_id = $1");
    }
}
