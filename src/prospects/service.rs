use super::error::ProspectError;
use super::scoring::record_history;
use super::types::{
    BulkCreateRequest, BulkCreateResult, CreateProspectRequest, Prospect, ProspectListQuery,
    ProspectListResponse, ProspectSource, ProspectStatistics, ProspectStatus,
    ProspectWithEngagement, UpdateProspectRequest,
};
use crate::campaigns::EngagementTracker;
use crate::shared::utils::{page_offset, DbPool};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Nullable, Text, Timestamptz, Uuid as SqlUuid};
use log::info;
use uuid::Uuid;

pub(super) const PROSPECT_COLUMNS: &str =
    "id, first_name, last_name, email, phone, company, job_title, industry, description, \
     notes, source, source_details, status, lead_score, campaign_id, \
     converted_to_contact_id, converted_at, assigned_to, created_by, last_contacted_at, \
     created_at, updated_at";

#[derive(QueryableByName)]
pub(super) struct ProspectRow {
    #[diesel(sql_type = SqlUuid)]
    id: Uuid,
    #[diesel(sql_type = Text)]
    first_name: String,
    #[diesel(sql_type = Nullable<Text>)]
    last_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    email: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    phone: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    company: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    job_title: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    industry: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    description: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    notes: Option<String>,
    #[diesel(sql_type = Text)]
    source: String,
    #[diesel(sql_type = Nullable<Text>)]
    source_details: Option<String>,
    #[diesel(sql_type = Text)]
    status: String,
    #[diesel(sql_type = Integer)]
    lead_score: i32,
    #[diesel(sql_type = Nullable<SqlUuid>)]
    campaign_id: Option<Uuid>,
    #[diesel(sql_type = Nullable<SqlUuid>)]
    converted_to_contact_id: Option<Uuid>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    converted_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<SqlUuid>)]
    assigned_to: Option<Uuid>,
    #[diesel(sql_type = Nullable<SqlUuid>)]
    created_by: Option<Uuid>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    last_contacted_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Timestamptz)]
    created_at: DateTime<Utc>,
    #[diesel(sql_type = Timestamptz)]
    updated_at: DateTime<Utc>,
}

impl ProspectRow {
    fn into_prospect(self) -> Result<Prospect, ProspectError> {
        let source = self
            .source
            .parse::<ProspectSource>()
            .map_err(ProspectError::QueryFailed)?;
        let status = self
            .status
            .parse::<ProspectStatus>()
            .map_err(ProspectError::QueryFailed)?;
        Ok(Prospect {
            id: self.id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            company: self.company,
            job_title: self.job_title,
            industry: self.industry,
            description: self.description,
            notes: self.notes,
            source,
            source_details: self.source_details,
            status,
            lead_score: self.lead_score,
            campaign_id: self.campaign_id,
            converted_to_contact_id: self.converted_to_contact_id,
            converted_at: self.converted_at,
            assigned_to: self.assigned_to,
            created_by: self.created_by,
            last_contacted_at: self.last_contacted_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(super) fn load_prospect(
    db_conn: &mut PgConnection,
    prospect_id: Uuid,
) -> Result<Prospect, ProspectError> {
    let row: ProspectRow = diesel::sql_query(format!(
        "SELECT {PROSPECT_COLUMNS} FROM prospects WHERE id = $1"
    ))
    .bind::<SqlUuid, _>(prospect_id)
    .get_result(db_conn)
    .map_err(|_| ProspectError::NotFound)?;
    row.into_prospect()
}

/// Duplicate detection matches on email OR phone, either field alone being
/// enough. Empty strings are treated as absent.
pub(super) fn find_duplicate(
    db_conn: &mut PgConnection,
    email: Option<&str>,
    phone: Option<&str>,
    exclude_id: Option<Uuid>,
) -> Result<Option<Uuid>, ProspectError> {
    let email = email.filter(|s| !s.is_empty());
    let phone = phone.filter(|s| !s.is_empty());
    if email.is_none() && phone.is_none() {
        return Ok(None);
    }

    #[derive(QueryableByName)]
    struct IdRow {
        #[diesel(sql_type = SqlUuid)]
        id: Uuid,
    }

    let rows: Vec<IdRow> = diesel::sql_query(
        "SELECT id FROM prospects
         WHERE (($1::text IS NOT NULL AND email = $1)
             OR ($2::text IS NOT NULL AND phone = $2))
           AND ($3::uuid IS NULL OR id <> $3)
         LIMIT 1",
    )
    .bind::<Nullable<Text>, _>(email)
    .bind::<Nullable<Text>, _>(phone)
    .bind::<Nullable<SqlUuid>, _>(exclude_id)
    .load(db_conn)
    .map_err(|e| ProspectError::QueryFailed(e.to_string()))?;

    Ok(rows.first().map(|r| r.id))
}

fn insert_prospect(
    db_conn: &mut PgConnection,
    request: &CreateProspectRequest,
    created_by: Uuid,
) -> Result<Uuid, ProspectError> {
    if request.first_name.trim().is_empty() {
        return Err(ProspectError::InvalidInput(
            "Prospect first name is required".to_string(),
        ));
    }

    let id = Uuid::new_v4();
    let now = Utc::now();
    let email = request.email.as_deref().filter(|s| !s.is_empty());
    let phone = request.phone.as_deref().filter(|s| !s.is_empty());
    let lead_score =
        super::scoring::apply_score_change(0, request.lead_score.unwrap_or(0));

    diesel::sql_query(
        r"INSERT INTO prospects
            (id, first_name, last_name, email, phone, company, job_title, industry,
             description, notes, source, source_details, status, lead_score,
             campaign_id, assigned_to, created_by, created_at, updated_at)
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'new', $13,
                  $14, $15, $16, $17, $17)",
    )
    .bind::<SqlUuid, _>(id)
    .bind::<Text, _>(request.first_name.trim())
    .bind::<Nullable<Text>, _>(request.last_name.as_deref())
    .bind::<Nullable<Text>, _>(email)
    .bind::<Nullable<Text>, _>(phone)
    .bind::<Nullable<Text>, _>(request.company.as_deref())
    .bind::<Nullable<Text>, _>(request.job_title.as_deref())
    .bind::<Nullable<Text>, _>(request.industry.as_deref())
    .bind::<Nullable<Text>, _>(request.description.as_deref())
    .bind::<Nullable<Text>, _>(request.notes.as_deref())
    .bind::<Text, _>(request.source.unwrap_or_default().to_string())
    .bind::<Nullable<Text>, _>(request.source_details.as_deref())
    .bind::<Integer, _>(lead_score)
    .bind::<Nullable<SqlUuid>, _>(request.campaign_id)
    .bind::<SqlUuid, _>(request.assigned_to.unwrap_or(created_by))
    .bind::<SqlUuid, _>(created_by)
    .bind::<Timestamptz, _>(now)
    .execute(db_conn)
    .map_err(|e| ProspectError::QueryFailed(e.to_string()))?;

    record_history(
        db_conn,
        id,
        0,
        lead_score,
        "Initial prospect creation",
        Some("created"),
        request.campaign_id,
        Some(created_by),
    )?;

    Ok(id)
}

pub struct ProspectService {
    conn: DbPool,
}

impl ProspectService {
    pub fn new(conn: DbPool) -> Self {
        Self { conn }
    }

    pub fn create_prospect(
        &self,
        request: CreateProspectRequest,
        created_by: Uuid,
    ) -> Result<Prospect, ProspectError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| ProspectError::DatabaseConnection)?;

        if find_duplicate(
            &mut db_conn,
            request.email.as_deref(),
            request.phone.as_deref(),
            None,
        )?
        .is_some()
        {
            return Err(ProspectError::Conflict(
                "Prospect with this email or phone already exists".to_string(),
            ));
        }

        let id = insert_prospect(&mut db_conn, &request, created_by)?;
        info!("Created prospect {id}");
        load_prospect(&mut db_conn, id)
    }

    pub fn bulk_create(
        &self,
        request: BulkCreateRequest,
        created_by: Uuid,
    ) -> Result<BulkCreateResult, ProspectError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| ProspectError::DatabaseConnection)?;

        let mut created_ids = Vec::new();
        let mut errors = Vec::new();
        let mut skipped_count = 0;

        for (idx, mut prospect) in request.prospects.into_iter().enumerate() {
            if prospect.campaign_id.is_none() {
                prospect.campaign_id = request.campaign_id;
            }

            let duplicate = find_duplicate(
                &mut db_conn,
                prospect.email.as_deref(),
                prospect.phone.as_deref(),
                None,
            )?;
            if duplicate.is_some() {
                if request.skip_duplicates {
                    skipped_count += 1;
                    continue;
                }
                return Err(ProspectError::Conflict(format!(
                    "Duplicate prospect at index {idx}"
                )));
            }

            match insert_prospect(&mut db_conn, &prospect, created_by) {
                Ok(id) => created_ids.push(id),
                Err(ProspectError::InvalidInput(msg)) => {
                    errors.push(format!("Index {idx}: {msg}"));
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Bulk prospect create: {} created, {skipped_count} skipped, {} errors",
            created_ids.len(),
            errors.len()
        );

        Ok(BulkCreateResult {
            created_count: created_ids.len() as i32,
            skipped_count,
            created_ids,
            errors,
        })
    }

    pub fn get_prospect(&self, prospect_id: Uuid) -> Result<Prospect, ProspectError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| ProspectError::DatabaseConnection)?;
        load_prospect(&mut db_conn, prospect_id)
    }

    pub fn get_with_engagement(
        &self,
        prospect_id: Uuid,
    ) -> Result<ProspectWithEngagement, ProspectError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| ProspectError::DatabaseConnection)?;
        let prospect = load_prospect(&mut db_conn, prospect_id)?;
        drop(db_conn);

        let tracker = EngagementTracker::new(self.conn.clone());
        let engagements = tracker
            .list_for_prospect(prospect_id)
            .map_err(|e| ProspectError::QueryFailed(e.to_string()))?;

        Ok(ProspectWithEngagement {
            total_campaigns: engagements.len(),
            prospect,
            engagements,
        })
    }

    /// Setting status to converted here triggers the full conversion flow,
    /// same as calling the convert endpoint.
    pub fn update_prospect(
        &self,
        prospect_id: Uuid,
        request: UpdateProspectRequest,
        updated_by: Option<Uuid>,
    ) -> Result<Prospect, ProspectError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| ProspectError::DatabaseConnection)?;

        let existing = load_prospect(&mut db_conn, prospect_id)?;

        let email = normalize_unique(request.email.clone(), existing.email.clone());
        let phone = normalize_unique(request.phone.clone(), existing.phone.clone());

        if (request.email.is_some() || request.phone.is_some())
            && find_duplicate(
                &mut db_conn,
                email.as_deref(),
                phone.as_deref(),
                Some(prospect_id),
            )?
            .is_some()
        {
            return Err(ProspectError::Conflict(
                "Another prospect with this email or phone already exists".to_string(),
            ));
        }

        if request.status == Some(ProspectStatus::Converted) && !existing.is_converted() {
            drop(db_conn);
            let converter = super::convert::ProspectConverter::new(self.conn.clone());
            let conversion = super::types::ConversionRequest {
                notes: Some("Automatically converted via status update".to_string()),
                create_activity: true,
                assign_to: existing.assigned_to,
            };
            let converted_by = updated_by
                .or(existing.assigned_to)
                .or(existing.created_by)
                .unwrap_or(Uuid::nil());
            converter.convert(prospect_id, &conversion, converted_by)?;
            return self.get_prospect(prospect_id);
        }

        let adjustment = manual_adjustment(existing.lead_score, request.lead_score);

        let first_name = request.first_name.unwrap_or(existing.first_name);
        if first_name.trim().is_empty() {
            return Err(ProspectError::InvalidInput(
                "Prospect first name is required".to_string(),
            ));
        }
        let last_name = request.last_name.or(existing.last_name);
        let company = request.company.or(existing.company);
        let job_title = request.job_title.or(existing.job_title);
        let industry = request.industry.or(existing.industry);
        let description = request.description.or(existing.description);
        let notes = request.notes.or(existing.notes);
        let source = request.source.unwrap_or(existing.source);
        let source_details = request.source_details.or(existing.source_details);
        let status = request.status.unwrap_or(existing.status);
        let lead_score = adjustment
            .map(|(_, new_score)| new_score)
            .unwrap_or(existing.lead_score);
        let campaign_id = request.campaign_id.or(existing.campaign_id);
        let assigned_to = request.assigned_to.or(existing.assigned_to);
        let last_contacted_at = request.last_contacted_at.or(existing.last_contacted_at);

        // The history row and the score it documents commit together.
        db_conn.transaction::<Prospect, ProspectError, _>(|conn| {
            if let Some((old_score, new_score)) = adjustment {
                record_history(
                    conn,
                    prospect_id,
                    old_score,
                    new_score,
                    "Manual score adjustment",
                    Some("manual_adjustment"),
                    None,
                    updated_by,
                )?;
            }

            diesel::sql_query(
                r"UPDATE prospects SET
                      first_name = $2, last_name = $3, email = $4, phone = $5, company = $6,
                      job_title = $7, industry = $8, description = $9, notes = $10,
                      source = $11, source_details = $12, status = $13, lead_score = $14,
                      campaign_id = $15, assigned_to = $16, last_contacted_at = $17,
                      updated_at = $18
                  WHERE id = $1",
            )
            .bind::<SqlUuid, _>(prospect_id)
            .bind::<Text, _>(first_name.trim())
            .bind::<Nullable<Text>, _>(last_name.as_deref())
            .bind::<Nullable<Text>, _>(email.as_deref())
            .bind::<Nullable<Text>, _>(phone.as_deref())
            .bind::<Nullable<Text>, _>(company.as_deref())
            .bind::<Nullable<Text>, _>(job_title.as_deref())
            .bind::<Nullable<Text>, _>(industry.as_deref())
            .bind::<Nullable<Text>, _>(description.as_deref())
            .bind::<Nullable<Text>, _>(notes.as_deref())
            .bind::<Text, _>(source.to_string())
            .bind::<Nullable<Text>, _>(source_details.as_deref())
            .bind::<Text, _>(status.to_string())
            .bind::<Integer, _>(lead_score)
            .bind::<Nullable<SqlUuid>, _>(campaign_id)
            .bind::<Nullable<SqlUuid>, _>(assigned_to)
            .bind::<Nullable<Timestamptz>, _>(last_contacted_at)
            .bind::<Timestamptz, _>(Utc::now())
            .execute(conn)
            .map_err(|e| ProspectError::QueryFailed(e.to_string()))?;

            load_prospect(conn, prospect_id)
        })
    }

    pub fn delete_prospect(&self, prospect_id: Uuid) -> Result<(), ProspectError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| ProspectError::DatabaseConnection)?;

        let deleted = diesel::sql_query("DELETE FROM prospects WHERE id = $1")
            .bind::<SqlUuid, _>(prospect_id)
            .execute(&mut db_conn)
            .map_err(|e| ProspectError::QueryFailed(e.to_string()))?;

        if deleted == 0 {
            return Err(ProspectError::NotFound);
        }
        info!("Deleted prospect {prospect_id}");
        Ok(())
    }

    pub fn list_prospects(
        &self,
        query: ProspectListQuery,
    ) -> Result<ProspectListResponse, ProspectError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| ProspectError::DatabaseConnection)?;

        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(25).clamp(1, 100);
        let offset = page_offset(page, per_page);

        let mut where_clauses = vec!["TRUE".to_string()];
        let mut param_count = 0;

        if query.search.is_some() {
            param_count += 1;
            where_clauses.push(format!(
                "(first_name ILIKE '%' || ${param_count} || '%' OR last_name ILIKE '%' || ${param_count} || '%' OR email ILIKE '%' || ${param_count} || '%' OR company ILIKE '%' || ${param_count} || '%')"
            ));
        }
        if let Some(raw) = query.status.as_deref() {
            let status = raw
                .parse::<ProspectStatus>()
                .map_err(ProspectError::InvalidInput)?;
            where_clauses.push(format!("status = '{status}'"));
        }
        if let Some(raw) = query.source.as_deref() {
            let source = raw
                .parse::<ProspectSource>()
                .map_err(ProspectError::InvalidInput)?;
            where_clauses.push(format!("source = '{source}'"));
        }
        if query.campaign_id.is_some() {
            param_count += 1;
            where_clauses.push(format!("campaign_id = ${param_count}"));
        }
        if query.min_lead_score.is_some() {
            param_count += 1;
            where_clauses.push(format!("lead_score >= ${param_count}"));
        }

        let where_clause = where_clauses.join(" AND ");
        let count_sql = format!("SELECT COUNT(*) AS count FROM prospects WHERE {where_clause}");
        let list_sql = format!(
            "SELECT {PROSPECT_COLUMNS} FROM prospects WHERE {where_clause}
             ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        );

        let mut count_query = diesel::sql_query(&count_sql).into_boxed();
        let mut list_query = diesel::sql_query(&list_sql).into_boxed();

        if let Some(ref search) = query.search {
            count_query = count_query.bind::<Text, _>(search.clone());
            list_query = list_query.bind::<Text, _>(search.clone());
        }
        if let Some(campaign_id) = query.campaign_id {
            count_query = count_query.bind::<SqlUuid, _>(campaign_id);
            list_query = list_query.bind::<SqlUuid, _>(campaign_id);
        }
        if let Some(min_score) = query.min_lead_score {
            count_query = count_query.bind::<Integer, _>(min_score);
            list_query = list_query.bind::<Integer, _>(min_score);
        }

        list_query = list_query
            .bind::<BigInt, _>(i64::from(per_page))
            .bind::<BigInt, _>(offset);

        #[derive(QueryableByName)]
        struct CountRow {
            #[diesel(sql_type = BigInt)]
            count: i64,
        }

        let total_count = count_query
            .get_result::<CountRow>(&mut db_conn)
            .map_err(|e| ProspectError::QueryFailed(e.to_string()))?
            .count;

        let rows: Vec<ProspectRow> = list_query
            .load(&mut db_conn)
            .map_err(|e| ProspectError::QueryFailed(e.to_string()))?;

        let prospects = rows
            .into_iter()
            .map(ProspectRow::into_prospect)
            .collect::<Result<Vec<_>, _>>()?;

        let total_pages = ((total_count as f64) / f64::from(per_page)).ceil() as i32;

        Ok(ProspectListResponse {
            prospects,
            total_count,
            page,
            per_page,
            total_pages,
        })
    }

    pub fn get_statistics(
        &self,
        campaign_id: Option<Uuid>,
    ) -> Result<ProspectStatistics, ProspectError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| ProspectError::DatabaseConnection)?;

        #[derive(QueryableByName)]
        struct StatsRow {
            #[diesel(sql_type = BigInt)]
            total: i64,
            #[diesel(sql_type = BigInt)]
            new_count: i64,
            #[diesel(sql_type = BigInt)]
            converted: i64,
            #[diesel(sql_type = BigInt)]
            rejected: i64,
            #[diesel(sql_type = Nullable<diesel::sql_types::Double>)]
            avg_score: Option<f64>,
        }

        let row: StatsRow = diesel::sql_query(
            r"SELECT
                  COUNT(*) AS total,
                  COUNT(*) FILTER (WHERE status = 'new') AS new_count,
                  COUNT(*) FILTER (WHERE status = 'converted') AS converted,
                  COUNT(*) FILTER (WHERE status = 'rejected') AS rejected,
                  AVG(lead_score)::float8 AS avg_score
              FROM prospects
              WHERE $1::uuid IS NULL OR campaign_id = $1",
        )
        .bind::<Nullable<SqlUuid>, _>(campaign_id)
        .get_result(&mut db_conn)
        .map_err(|e| ProspectError::QueryFailed(e.to_string()))?;

        let conversion_rate = if row.total > 0 {
            (row.converted as f64 / row.total as f64) * 100.0
        } else {
            0.0
        };

        Ok(ProspectStatistics {
            total_prospects: row.total,
            new_prospects: row.new_count,
            converted_prospects: row.converted,
            rejected_prospects: row.rejected,
            average_lead_score: row.avg_score.unwrap_or(0.0),
            conversion_rate,
        })
    }
}

/// A requested manual score, clamped to the valid range. None when the score
/// would not actually change, so no history row is written for a no-op.
fn manual_adjustment(existing: i32, requested: Option<i32>) -> Option<(i32, i32)> {
    let clamped = requested?.clamp(super::scoring::MIN_LEAD_SCORE, super::scoring::MAX_LEAD_SCORE);
    (clamped != existing).then_some((existing, clamped))
}

/// Empty strings on unique columns become NULL so they never collide in the
/// unique index.
fn normalize_unique(incoming: Option<String>, existing: Option<String>) -> Option<String> {
    match incoming {
        Some(s) if s.is_empty() => None,
        Some(s) => Some(s),
        None => existing.filter(|s| !s.is_empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_unique_fields_become_none() {
        assert_eq!(normalize_unique(Some(String::new()), None), None);
        assert_eq!(
            normalize_unique(Some("a@b.c".to_string()), None),
            Some("a@b.c".to_string())
        );
        assert_eq!(
            normalize_unique(None, Some("kept@b.c".to_string())),
            Some("kept@b.c".to_string())
        );
        assert_eq!(normalize_unique(None, Some(String::new())), None);
    }

    #[test]
    fn manual_adjustment_clamps_and_skips_no_ops() {
        assert_eq!(manual_adjustment(40, None), None);
        assert_eq!(manual_adjustment(40, Some(40)), None);
        assert_eq!(manual_adjustment(40, Some(75)), Some((40, 75)));
        assert_eq!(manual_adjustment(40, Some(500)), Some((40, 100)));
        assert_eq!(manual_adjustment(40, Some(-10)), Some((40, 0)));
        // Clamping can turn an out-of-range request into the current score.
        assert_eq!(manual_adjustment(100, Some(500)), None);
    }
}
