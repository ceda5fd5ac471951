use super::error::CampaignError;
use super::types::{
    Campaign, CampaignListQuery, CampaignListResponse, CampaignStatus, CampaignType,
    CreateCampaignRequest, UpdateCampaignRequest,
};
use crate::shared::utils::{page_offset, DbPool};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{
    BigInt, Integer, Nullable, Numeric, Text, Timestamptz, Uuid as SqlUuid,
};
use log::info;
use uuid::Uuid;

// tags is JSONB; selecting it as text keeps the row type simple.
pub(super) const CAMPAIGN_COLUMNS: &str =
    "id, name, description, campaign_type, status, start_date, end_date, actual_start_date, \
     actual_end_date, budget, actual_cost, expected_revenue, actual_revenue, \
     target_audience_size, target_response_rate, target_conversion_rate, sent_count, \
     delivered_count, opened_count, clicked_count, responded_count, bounced_count, \
     unsubscribed_count, converted_count, prospects_generated, email_template_id, \
     email_subject, email_from_name, email_from_email, tags::text AS tags, category, \
     owner_id, created_by, notes, created_at, updated_at, last_executed_at";

#[derive(QueryableByName)]
pub(super) struct CampaignRow {
    #[diesel(sql_type = SqlUuid)]
    id: Uuid,
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Nullable<Text>)]
    description: Option<String>,
    #[diesel(sql_type = Text)]
    campaign_type: String,
    #[diesel(sql_type = Text)]
    status: String,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    start_date: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    end_date: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    actual_start_date: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    actual_end_date: Option<DateTime<Utc>>,
    #[diesel(sql_type = Numeric)]
    budget: BigDecimal,
    #[diesel(sql_type = Numeric)]
    actual_cost: BigDecimal,
    #[diesel(sql_type = Nullable<Numeric>)]
    expected_revenue: Option<BigDecimal>,
    #[diesel(sql_type = Numeric)]
    actual_revenue: BigDecimal,
    #[diesel(sql_type = Integer)]
    target_audience_size: i32,
    #[diesel(sql_type = Nullable<Numeric>)]
    target_response_rate: Option<BigDecimal>,
    #[diesel(sql_type = Nullable<Numeric>)]
    target_conversion_rate: Option<BigDecimal>,
    #[diesel(sql_type = Integer)]
    sent_count: i32,
    #[diesel(sql_type = Integer)]
    delivered_count: i32,
    #[diesel(sql_type = Integer)]
    opened_count: i32,
    #[diesel(sql_type = Integer)]
    clicked_count: i32,
    #[diesel(sql_type = Integer)]
    responded_count: i32,
    #[diesel(sql_type = Integer)]
    bounced_count: i32,
    #[diesel(sql_type = Integer)]
    unsubscribed_count: i32,
    #[diesel(sql_type = Integer)]
    converted_count: i32,
    #[diesel(sql_type = Integer)]
    prospects_generated: i32,
    #[diesel(sql_type = Nullable<SqlUuid>)]
    email_template_id: Option<Uuid>,
    #[diesel(sql_type = Nullable<Text>)]
    email_subject: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    email_from_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    email_from_email: Option<String>,
    #[diesel(sql_type = Text)]
    tags: String,
    #[diesel(sql_type = Nullable<Text>)]
    category: Option<String>,
    #[diesel(sql_type = SqlUuid)]
    owner_id: Uuid,
    #[diesel(sql_type = Nullable<SqlUuid>)]
    created_by: Option<Uuid>,
    #[diesel(sql_type = Nullable<Text>)]
    notes: Option<String>,
    #[diesel(sql_type = Timestamptz)]
    created_at: DateTime<Utc>,
    #[diesel(sql_type = Timestamptz)]
    updated_at: DateTime<Utc>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    last_executed_at: Option<DateTime<Utc>>,
}

impl CampaignRow {
    fn into_campaign(self) -> Result<Campaign, CampaignError> {
        let campaign_type = self
            .campaign_type
            .parse::<CampaignType>()
            .map_err(CampaignError::QueryFailed)?;
        let status = self
            .status
            .parse::<CampaignStatus>()
            .map_err(CampaignError::QueryFailed)?;
        let tags: Vec<String> = serde_json::from_str(&self.tags).unwrap_or_default();

        Ok(Campaign {
            id: self.id,
            name: self.name,
            description: self.description,
            campaign_type,
            status,
            start_date: self.start_date,
            end_date: self.end_date,
            actual_start_date: self.actual_start_date,
            actual_end_date: self.actual_end_date,
            budget: self.budget,
            actual_cost: self.actual_cost,
            expected_revenue: self.expected_revenue,
            actual_revenue: self.actual_revenue,
            target_audience_size: self.target_audience_size,
            target_response_rate: self.target_response_rate,
            target_conversion_rate: self.target_conversion_rate,
            sent_count: self.sent_count,
            delivered_count: self.delivered_count,
            opened_count: self.opened_count,
            clicked_count: self.clicked_count,
            responded_count: self.responded_count,
            bounced_count: self.bounced_count,
            unsubscribed_count: self.unsubscribed_count,
            converted_count: self.converted_count,
            prospects_generated: self.prospects_generated,
            email_template_id: self.email_template_id,
            email_subject: self.email_subject,
            email_from_name: self.email_from_name,
            email_from_email: self.email_from_email,
            tags,
            category: self.category,
            owner_id: self.owner_id,
            created_by: self.created_by,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_executed_at: self.last_executed_at,
        })
    }
}

pub(super) fn load_campaign(
    db_conn: &mut PgConnection,
    campaign_id: Uuid,
) -> Result<Campaign, CampaignError> {
    let row: CampaignRow = diesel::sql_query(format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1"
    ))
    .bind::<SqlUuid, _>(campaign_id)
    .get_result(db_conn)
    .map_err(|_| CampaignError::NotFound)?;
    row.into_campaign()
}

pub struct CampaignService {
    conn: DbPool,
}

impl CampaignService {
    pub fn new(conn: DbPool) -> Self {
        Self { conn }
    }

    pub fn create_campaign(
        &self,
        request: CreateCampaignRequest,
        created_by: Uuid,
    ) -> Result<Campaign, CampaignError> {
        if request.name.trim().is_empty() {
            return Err(CampaignError::InvalidInput(
                "Campaign name is required".to_string(),
            ));
        }

        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let owner_id = request.owner_id.unwrap_or(created_by);
        let tags_json = serde_json::to_string(&request.tags.unwrap_or_default())
            .map_err(|e| CampaignError::InvalidInput(e.to_string()))?;

        diesel::sql_query(
            r"INSERT INTO campaigns
                (id, name, description, campaign_type, status, start_date, end_date,
                 budget, expected_revenue, target_response_rate, target_conversion_rate,
                 email_template_id, email_subject, email_from_name, email_from_email,
                 tags, category, owner_id, created_by, notes, created_at, updated_at)
              VALUES ($1, $2, $3, $4, 'draft', $5, $6, $7, $8, $9, $10,
                      $11, $12, $13, $14, $15::jsonb, $16, $17, $18, $19, $20, $20)",
        )
        .bind::<SqlUuid, _>(id)
        .bind::<Text, _>(request.name.trim())
        .bind::<Nullable<Text>, _>(request.description.as_deref())
        .bind::<Text, _>(request.campaign_type.to_string())
        .bind::<Nullable<Timestamptz>, _>(request.start_date)
        .bind::<Nullable<Timestamptz>, _>(request.end_date)
        .bind::<Numeric, _>(request.budget.unwrap_or_else(|| BigDecimal::from(0)))
        .bind::<Nullable<Numeric>, _>(request.expected_revenue)
        .bind::<Nullable<Numeric>, _>(request.target_response_rate)
        .bind::<Nullable<Numeric>, _>(request.target_conversion_rate)
        .bind::<Nullable<SqlUuid>, _>(request.email_template_id)
        .bind::<Nullable<Text>, _>(request.email_subject.as_deref())
        .bind::<Nullable<Text>, _>(request.email_from_name.as_deref())
        .bind::<Nullable<Text>, _>(request.email_from_email.as_deref())
        .bind::<Text, _>(&tags_json)
        .bind::<Nullable<Text>, _>(request.category.as_deref())
        .bind::<SqlUuid, _>(owner_id)
        .bind::<SqlUuid, _>(created_by)
        .bind::<Nullable<Text>, _>(request.notes.as_deref())
        .bind::<Timestamptz, _>(now)
        .execute(&mut db_conn)
        .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

        info!("Created campaign {id} ({})", request.name.trim());
        load_campaign(&mut db_conn, id)
    }

    pub fn get_campaign(&self, campaign_id: Uuid) -> Result<Campaign, CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;
        load_campaign(&mut db_conn, campaign_id)
    }

    pub fn update_campaign(
        &self,
        campaign_id: Uuid,
        request: UpdateCampaignRequest,
    ) -> Result<Campaign, CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        let existing = load_campaign(&mut db_conn, campaign_id)?;

        if let Some(new_status) = request.status {
            validate_status_change(existing.status, new_status)?;
        }

        let name = request.name.unwrap_or(existing.name);
        if name.trim().is_empty() {
            return Err(CampaignError::InvalidInput(
                "Campaign name is required".to_string(),
            ));
        }
        let description = request.description.or(existing.description);
        let status = request.status.unwrap_or(existing.status);
        let start_date = request.start_date.or(existing.start_date);
        let end_date = request.end_date.or(existing.end_date);
        let budget = request.budget.unwrap_or(existing.budget);
        let actual_cost = request.actual_cost.unwrap_or(existing.actual_cost);
        let expected_revenue = request.expected_revenue.or(existing.expected_revenue);
        let target_response_rate = request
            .target_response_rate
            .or(existing.target_response_rate);
        let target_conversion_rate = request
            .target_conversion_rate
            .or(existing.target_conversion_rate);
        let email_template_id = request.email_template_id.or(existing.email_template_id);
        let email_subject = request.email_subject.or(existing.email_subject);
        let email_from_name = request.email_from_name.or(existing.email_from_name);
        let email_from_email = request.email_from_email.or(existing.email_from_email);
        let tags = request.tags.unwrap_or(existing.tags);
        let category = request.category.or(existing.category);
        let notes = request.notes.or(existing.notes);

        let tags_json = serde_json::to_string(&tags)
            .map_err(|e| CampaignError::InvalidInput(e.to_string()))?;
        let now = Utc::now();

        // A campaign leaving active for completed/cancelled gets its end
        // stamp once.
        let actual_end_date = if matches!(
            status,
            CampaignStatus::Completed | CampaignStatus::Cancelled
        ) {
            existing.actual_end_date.or(Some(now))
        } else {
            existing.actual_end_date
        };

        diesel::sql_query(
            r"UPDATE campaigns SET
                  name = $2, description = $3, status = $4, start_date = $5, end_date = $6,
                  actual_end_date = $7, budget = $8, actual_cost = $9, expected_revenue = $10,
                  target_response_rate = $11, target_conversion_rate = $12,
                  email_template_id = $13, email_subject = $14, email_from_name = $15,
                  email_from_email = $16, tags = $17::jsonb, category = $18, notes = $19,
                  updated_at = $20
              WHERE id = $1",
        )
        .bind::<SqlUuid, _>(campaign_id)
        .bind::<Text, _>(name.trim())
        .bind::<Nullable<Text>, _>(description.as_deref())
        .bind::<Text, _>(status.to_string())
        .bind::<Nullable<Timestamptz>, _>(start_date)
        .bind::<Nullable<Timestamptz>, _>(end_date)
        .bind::<Nullable<Timestamptz>, _>(actual_end_date)
        .bind::<Numeric, _>(budget)
        .bind::<Numeric, _>(actual_cost)
        .bind::<Nullable<Numeric>, _>(expected_revenue)
        .bind::<Nullable<Numeric>, _>(target_response_rate)
        .bind::<Nullable<Numeric>, _>(target_conversion_rate)
        .bind::<Nullable<SqlUuid>, _>(email_template_id)
        .bind::<Nullable<Text>, _>(email_subject.as_deref())
        .bind::<Nullable<Text>, _>(email_from_name.as_deref())
        .bind::<Nullable<Text>, _>(email_from_email.as_deref())
        .bind::<Text, _>(&tags_json)
        .bind::<Nullable<Text>, _>(category.as_deref())
        .bind::<Nullable<Text>, _>(notes.as_deref())
        .bind::<Timestamptz, _>(now)
        .execute(&mut db_conn)
        .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

        load_campaign(&mut db_conn, campaign_id)
    }

    pub fn delete_campaign(&self, campaign_id: Uuid) -> Result<(), CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        let deleted = diesel::sql_query("DELETE FROM campaigns WHERE id = $1")
            .bind::<SqlUuid, _>(campaign_id)
            .execute(&mut db_conn)
            .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

        if deleted == 0 {
            return Err(CampaignError::NotFound);
        }
        info!("Deleted campaign {campaign_id}");
        Ok(())
    }

    pub fn list_campaigns(
        &self,
        query: CampaignListQuery,
    ) -> Result<CampaignListResponse, CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(25).clamp(1, 100);
        let offset = page_offset(page, per_page);

        let (where_clause, param_count) = build_campaign_filters(&query)?;

        let count_sql = format!("SELECT COUNT(*) AS count FROM campaigns WHERE {where_clause}");
        let list_sql = format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE {where_clause}
             ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        );

        let mut count_query = diesel::sql_query(&count_sql).into_boxed();
        let mut list_query = diesel::sql_query(&list_sql).into_boxed();

        // Bind order must match the clause order in build_campaign_filters.
        if let Some(ref search) = query.search {
            count_query = count_query.bind::<Text, _>(search.clone());
            list_query = list_query.bind::<Text, _>(search.clone());
        }
        if let Some(ref category) = query.category {
            count_query = count_query.bind::<Text, _>(category.clone());
            list_query = list_query.bind::<Text, _>(category.clone());
        }
        if let Some(owner_id) = query.owner_id {
            count_query = count_query.bind::<SqlUuid, _>(owner_id);
            list_query = list_query.bind::<SqlUuid, _>(owner_id);
        }
        if let Some(ref tag) = query.tag {
            let tag_json = serde_json::to_string(&vec![tag.clone()])
                .map_err(|e| CampaignError::InvalidInput(e.to_string()))?;
            count_query = count_query.bind::<Text, _>(tag_json.clone());
            list_query = list_query.bind::<Text, _>(tag_json);
        }
        if let Some(after) = query.start_date_after {
            count_query = count_query.bind::<Timestamptz, _>(after);
            list_query = list_query.bind::<Timestamptz, _>(after);
        }
        if let Some(before) = query.start_date_before {
            count_query = count_query.bind::<Timestamptz, _>(before);
            list_query = list_query.bind::<Timestamptz, _>(before);
        }
        if let Some(ref min_budget) = query.min_budget {
            count_query = count_query.bind::<Numeric, _>(min_budget.clone());
            list_query = list_query.bind::<Numeric, _>(min_budget.clone());
        }
        if let Some(ref max_budget) = query.max_budget {
            count_query = count_query.bind::<Numeric, _>(max_budget.clone());
            list_query = list_query.bind::<Numeric, _>(max_budget.clone());
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
            .map_err(|e| CampaignError::QueryFailed(e.to_string()))?
            .count;

        let rows: Vec<CampaignRow> = list_query
            .load(&mut db_conn)
            .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

        let campaigns = rows
            .into_iter()
            .map(CampaignRow::into_campaign)
            .collect::<Result<Vec<_>, _>>()?;

        let total_pages = ((total_count as f64) / (f64::from(per_page))).ceil() as i32;

        Ok(CampaignListResponse {
            campaigns,
            total_count,
            page,
            per_page,
            total_pages,
        })
    }
}

/// Builds the shared WHERE clause for the campaign count and page queries,
/// returning it with the number of bind parameters it consumes. The caller
/// binds values in the same order the clauses are pushed here.
fn build_campaign_filters(query: &CampaignListQuery) -> Result<(String, i32), CampaignError> {
    let mut where_clauses = vec!["TRUE".to_string()];
    let mut param_count = 0;

    if query.search.is_some() {
        param_count += 1;
        where_clauses.push(format!(
            "(name ILIKE '%' || ${param_count} || '%' OR description ILIKE '%' || ${param_count} || '%')"
        ));
    }

    if let Some(raw) = query.status.as_deref() {
        let statuses = parse_list::<CampaignStatus>(raw)?;
        if !statuses.is_empty() {
            let quoted: Vec<String> = statuses.iter().map(|s| format!("'{s}'")).collect();
            where_clauses.push(format!("status IN ({})", quoted.join(", ")));
        }
    }

    if let Some(raw) = query.campaign_type.as_deref() {
        let types = parse_list::<CampaignType>(raw)?;
        if !types.is_empty() {
            let quoted: Vec<String> = types.iter().map(|t| format!("'{t}'")).collect();
            where_clauses.push(format!("campaign_type IN ({})", quoted.join(", ")));
        }
    }

    if query.category.is_some() {
        param_count += 1;
        where_clauses.push(format!("category = ${param_count}"));
    }
    if query.owner_id.is_some() {
        param_count += 1;
        where_clauses.push(format!("owner_id = ${param_count}"));
    }
    if query.tag.is_some() {
        param_count += 1;
        where_clauses.push(format!("tags @> ${param_count}::jsonb"));
    }
    if query.start_date_after.is_some() {
        param_count += 1;
        where_clauses.push(format!("start_date >= ${param_count}"));
    }
    if query.start_date_before.is_some() {
        param_count += 1;
        where_clauses.push(format!("start_date <= ${param_count}"));
    }
    if query.min_budget.is_some() {
        param_count += 1;
        where_clauses.push(format!("budget >= ${param_count}"));
    }
    if query.max_budget.is_some() {
        param_count += 1;
        where_clauses.push(format!("budget <= ${param_count}"));
    }

    Ok((where_clauses.join(" AND "), param_count))
}

fn parse_list<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<Vec<T>, CampaignError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>().map_err(CampaignError::InvalidInput))
        .collect()
}

/// Draft is the only re-enterable status; a campaign that has run cannot be
/// put back to draft, and terminal statuses stay terminal.
fn validate_status_change(
    from: CampaignStatus,
    to: CampaignStatus,
) -> Result<(), CampaignError> {
    if from == to {
        return Ok(());
    }
    let allowed = match from {
        CampaignStatus::Draft => matches!(
            to,
            CampaignStatus::Scheduled | CampaignStatus::Active | CampaignStatus::Cancelled
        ),
        CampaignStatus::Scheduled => matches!(
            to,
            CampaignStatus::Draft | CampaignStatus::Active | CampaignStatus::Cancelled
        ),
        CampaignStatus::Active => matches!(
            to,
            CampaignStatus::Paused | CampaignStatus::Completed | CampaignStatus::Cancelled
        ),
        CampaignStatus::Paused => matches!(
            to,
            CampaignStatus::Active | CampaignStatus::Completed | CampaignStatus::Cancelled
        ),
        CampaignStatus::Completed | CampaignStatus::Cancelled => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(CampaignError::InvalidState(format!(
            "Cannot change campaign status from {from} to {to}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_changes_follow_lifecycle() {
        assert!(validate_status_change(CampaignStatus::Draft, CampaignStatus::Scheduled).is_ok());
        assert!(validate_status_change(CampaignStatus::Active, CampaignStatus::Paused).is_ok());
        assert!(validate_status_change(CampaignStatus::Paused, CampaignStatus::Active).is_ok());
        assert!(
            validate_status_change(CampaignStatus::Completed, CampaignStatus::Active).is_err()
        );
        assert!(validate_status_change(CampaignStatus::Active, CampaignStatus::Draft).is_err());
        assert!(
            validate_status_change(CampaignStatus::Cancelled, CampaignStatus::Cancelled).is_ok()
        );
    }

    #[test]
    fn owner_and_tag_filters_land_in_the_where_clause() {
        let query = CampaignListQuery {
            owner_id: Some(Uuid::new_v4()),
            tag: Some("q3-launch".to_string()),
            ..CampaignListQuery::default()
        };
        let (clause, params) = build_campaign_filters(&query).unwrap();
        assert!(clause.contains("owner_id = $1"));
        assert!(clause.contains("tags @> $2::jsonb"));
        assert_eq!(params, 2);

        let (clause, params) = build_campaign_filters(&CampaignListQuery::default()).unwrap();
        assert_eq!(clause, "TRUE");
        assert_eq!(params, 0);
    }

    #[test]
    fn status_filter_parses_comma_list() {
        let parsed = parse_list::<CampaignStatus>("draft, active").unwrap();
        assert_eq!(parsed, vec![CampaignStatus::Draft, CampaignStatus::Active]);
        assert!(parse_list::<CampaignStatus>("draft,nope").is_err());
    }
}
