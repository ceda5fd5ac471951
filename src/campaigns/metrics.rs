use super::audience::engagement_score;
use super::error::CampaignError;
use super::service::load_campaign;
use super::types::{
    AnalyticsResponse, Campaign, CampaignMetricsResponse, CampaignStatistics, ConversionEntry,
    ConversionFunnel, ConversionsResponse, EngagementStatus, Recipient, TimelinePoint,
    TopPerformer,
};
use crate::shared::utils::DbPool;
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Nullable, Numeric, Text, Timestamptz, Uuid as SqlUuid};
use log::debug;
use uuid::Uuid;

pub fn rate_pct(numerator: i32, denominator: i32) -> f64 {
    if denominator > 0 {
        (f64::from(numerator) / f64::from(denominator)) * 100.0
    } else {
        0.0
    }
}

pub fn roi_pct(revenue: &BigDecimal, cost: &BigDecimal) -> f64 {
    let cost_f = cost.to_f64().unwrap_or(0.0);
    if cost_f > 0.0 {
        let revenue_f = revenue.to_f64().unwrap_or(0.0);
        ((revenue_f - cost_f) / cost_f) * 100.0
    } else {
        0.0
    }
}

pub fn metrics_response(campaign: &Campaign) -> CampaignMetricsResponse {
    CampaignMetricsResponse {
        campaign_id: campaign.id,
        campaign_name: campaign.name.clone(),
        sent_count: campaign.sent_count,
        delivered_count: campaign.delivered_count,
        opened_count: campaign.opened_count,
        clicked_count: campaign.clicked_count,
        responded_count: campaign.responded_count,
        bounced_count: campaign.bounced_count,
        unsubscribed_count: campaign.unsubscribed_count,
        converted_count: campaign.converted_count,
        prospects_generated: campaign.prospects_generated,
        delivery_rate: rate_pct(campaign.delivered_count, campaign.sent_count),
        open_rate: rate_pct(campaign.opened_count, campaign.delivered_count),
        click_rate: rate_pct(campaign.clicked_count, campaign.opened_count),
        response_rate: rate_pct(campaign.responded_count, campaign.delivered_count),
        conversion_rate: rate_pct(campaign.converted_count, campaign.delivered_count),
        bounce_rate: rate_pct(campaign.bounced_count, campaign.sent_count),
        budget: campaign.budget.clone(),
        actual_cost: campaign.actual_cost.clone(),
        actual_revenue: campaign.actual_revenue.clone(),
        roi: roi_pct(&campaign.actual_revenue, &campaign.actual_cost),
    }
}

/// Recomputes campaign counters from the engagement records and serves the
/// derived analytics. This is the only writer of the counter columns; the
/// tracker and executor only touch engagement rows.
pub struct MetricsAggregator {
    conn: DbPool,
}

impl MetricsAggregator {
    pub fn new(conn: DbPool) -> Self {
        Self { conn }
    }

    /// Rebuilds every counter on the campaign row by scanning its
    /// engagement records. Counters are first-occurrence timestamps, so a
    /// member who opened five times still counts once.
    pub fn recompute(&self, campaign_id: Uuid) -> Result<CampaignMetricsResponse, CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;
        recompute_counters(&mut db_conn, campaign_id)?;
        let campaign = load_campaign(&mut db_conn, campaign_id)?;
        Ok(metrics_response(&campaign))
    }

    pub fn get_metrics(&self, campaign_id: Uuid) -> Result<CampaignMetricsResponse, CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;
        let campaign = load_campaign(&mut db_conn, campaign_id)?;
        Ok(metrics_response(&campaign))
    }

    /// Writes one dated snapshot row of the current counters, for the
    /// timeline chart.
    pub fn record_snapshot(&self, campaign_id: Uuid) -> Result<(), CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;
        record_snapshot_conn(&mut db_conn, campaign_id)
    }

    pub fn get_timeline(
        &self,
        campaign_id: Uuid,
        days: i64,
    ) -> Result<Vec<TimelinePoint>, CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        super::audience::ensure_campaign_exists(&mut db_conn, campaign_id)?;

        let since = Utc::now() - chrono::Duration::days(days.max(1));
        let rows: Vec<SnapshotRow> = diesel::sql_query(
            "SELECT metric_date, emails_sent, emails_delivered, emails_opened,
                    emails_clicked, conversions
             FROM campaign_metrics WHERE campaign_id = $1 AND metric_date >= $2
             ORDER BY metric_date ASC",
        )
        .bind::<SqlUuid, _>(campaign_id)
        .bind::<Timestamptz, _>(since)
        .load(&mut db_conn)
        .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| TimelinePoint {
                date: row.metric_date,
                sent: row.emails_sent,
                delivered: row.emails_delivered,
                opened: row.emails_opened,
                clicked: row.emails_clicked,
                converted: row.conversions,
                open_rate: rate_pct(row.emails_opened, row.emails_delivered),
                click_rate: rate_pct(row.emails_clicked, row.emails_opened),
                conversion_rate: rate_pct(row.conversions, row.emails_delivered),
            })
            .collect())
    }

    pub fn get_top_performers(
        &self,
        campaign_id: Uuid,
        limit: i64,
    ) -> Result<Vec<TopPerformer>, CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        let rows: Vec<PerformerRow> = diesel::sql_query(
            r"SELECT e.contact_id, e.prospect_id, e.status, e.open_count, e.click_count,
                     COALESCE(c.first_name, p.first_name) AS first_name,
                     COALESCE(c.last_name, p.last_name) AS last_name,
                     COALESCE(c.email, p.email) AS email
              FROM engagement_records e
              LEFT JOIN contacts c ON c.id = e.contact_id
              LEFT JOIN prospects p ON p.id = e.prospect_id
              WHERE e.campaign_id = $1 AND (e.open_count > 0 OR e.click_count > 0)
              ORDER BY e.open_count + e.click_count * 2 DESC
              LIMIT $2",
        )
        .bind::<SqlUuid, _>(campaign_id)
        .bind::<BigInt, _>(limit)
        .load(&mut db_conn)
        .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

        let mut performers = Vec::with_capacity(rows.len());
        for row in rows {
            let recipient = match (row.contact_id, row.prospect_id) {
                (Some(id), None) => Recipient::Contact(id),
                (None, Some(id)) => Recipient::Prospect(id),
                _ => continue,
            };
            let status = row
                .status
                .parse::<EngagementStatus>()
                .map_err(CampaignError::QueryFailed)?;
            let name = match (row.first_name, row.last_name) {
                (Some(f), Some(l)) => format!("{f} {l}"),
                (Some(f), None) => f,
                (None, Some(l)) => l,
                (None, None) => String::new(),
            };
            performers.push(TopPerformer {
                recipient,
                name,
                email: row.email,
                engagement_score: engagement_score(status, row.open_count, row.click_count),
                opens: row.open_count,
                clicks: row.click_count,
                converted: status == EngagementStatus::Converted,
            });
        }
        Ok(performers)
    }

    pub fn get_conversions(&self, campaign_id: Uuid) -> Result<ConversionsResponse, CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        super::audience::ensure_campaign_exists(&mut db_conn, campaign_id)?;

        let rows: Vec<ConversionRow> = diesel::sql_query(
            "SELECT id, contact_id, prospect_id, deal_id, converted_at, conversion_value
             FROM engagement_records
             WHERE campaign_id = $1 AND deal_id IS NOT NULL
             ORDER BY converted_at DESC NULLS LAST",
        )
        .bind::<SqlUuid, _>(campaign_id)
        .load(&mut db_conn)
        .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

        let conversions: Vec<ConversionEntry> = rows
            .into_iter()
            .filter_map(|row| {
                row.deal_id.map(|deal_id| ConversionEntry {
                    engagement_id: row.id,
                    deal_id,
                    contact_id: row.contact_id,
                    prospect_id: row.prospect_id,
                    converted_at: row.converted_at,
                    conversion_value: row.conversion_value,
                })
            })
            .collect();

        Ok(ConversionsResponse {
            campaign_id,
            total: conversions.len(),
            conversions,
        })
    }

    pub fn get_analytics(&self, campaign_id: Uuid) -> Result<AnalyticsResponse, CampaignError> {
        let metrics = self.recompute(campaign_id)?;
        let time_series = self.get_timeline(campaign_id, 30)?;
        let top_performers = self.get_top_performers(campaign_id, 10)?;
        let conversion_funnel = ConversionFunnel {
            sent: metrics.sent_count,
            delivered: metrics.delivered_count,
            opened: metrics.opened_count,
            clicked: metrics.clicked_count,
            responded: metrics.responded_count,
            converted: metrics.converted_count,
        };
        Ok(AnalyticsResponse {
            campaign_id,
            metrics,
            time_series,
            top_performers,
            conversion_funnel,
        })
    }

    pub fn get_statistics(&self) -> Result<CampaignStatistics, CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        let row: StatisticsRow = diesel::sql_query(
            r"SELECT
                  COUNT(*) AS total_campaigns,
                  COUNT(*) FILTER (WHERE status = 'draft') AS draft_campaigns,
                  COUNT(*) FILTER (WHERE status = 'active') AS active_campaigns,
                  COUNT(*) FILTER (WHERE status = 'completed') AS completed_campaigns,
                  COALESCE(SUM(budget), 0)::float8 AS total_budget,
                  COALESCE(SUM(actual_cost), 0)::float8 AS total_spent,
                  COALESCE(SUM(actual_revenue), 0)::float8 AS total_revenue,
                  COALESCE(SUM(prospects_generated), 0) AS total_prospects,
                  COALESCE(SUM(converted_count), 0) AS total_conversions,
                  COALESCE(SUM(delivered_count), 0) AS total_delivered
              FROM campaigns",
        )
        .get_result(&mut db_conn)
        .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

        let overall_roi = if row.total_spent > 0.0 {
            ((row.total_revenue - row.total_spent) / row.total_spent) * 100.0
        } else {
            0.0
        };
        let average_conversion_rate = if row.total_delivered > 0 {
            (row.total_conversions as f64 / row.total_delivered as f64) * 100.0
        } else {
            0.0
        };

        Ok(CampaignStatistics {
            total_campaigns: row.total_campaigns,
            draft_campaigns: row.draft_campaigns,
            active_campaigns: row.active_campaigns,
            completed_campaigns: row.completed_campaigns,
            total_budget: row.total_budget,
            total_spent: row.total_spent,
            total_revenue: row.total_revenue,
            overall_roi,
            total_prospects: row.total_prospects,
            total_conversions: row.total_conversions,
            average_conversion_rate,
        })
    }
}

pub(super) fn record_snapshot_conn(
    db_conn: &mut PgConnection,
    campaign_id: Uuid,
) -> Result<(), CampaignError> {
    let campaign = load_campaign(db_conn, campaign_id)?;

    diesel::sql_query(
        "INSERT INTO campaign_metrics
           (id, campaign_id, metric_date, emails_sent, emails_delivered,
            emails_opened, emails_clicked, conversions)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind::<SqlUuid, _>(Uuid::new_v4())
    .bind::<SqlUuid, _>(campaign_id)
    .bind::<Timestamptz, _>(Utc::now())
    .bind::<Integer, _>(campaign.sent_count)
    .bind::<Integer, _>(campaign.delivered_count)
    .bind::<Integer, _>(campaign.opened_count)
    .bind::<Integer, _>(campaign.clicked_count)
    .bind::<Integer, _>(campaign.converted_count)
    .execute(db_conn)
    .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

    debug!("Recorded metrics snapshot for campaign {campaign_id}");
    Ok(())
}

pub(super) fn recompute_counters(
    db_conn: &mut PgConnection,
    campaign_id: Uuid,
) -> Result<(), CampaignError> {
    super::audience::ensure_campaign_exists(db_conn, campaign_id)?;

    diesel::sql_query(
        r"UPDATE campaigns SET
              sent_count = agg.sent,
              delivered_count = agg.delivered,
              opened_count = agg.opened,
              clicked_count = agg.clicked,
              responded_count = agg.responded,
              bounced_count = agg.bounced,
              unsubscribed_count = agg.unsubscribed,
              converted_count = agg.converted,
              actual_revenue = agg.revenue,
              prospects_generated = (
                  SELECT COUNT(*) FROM prospects WHERE campaign_id = $1
              ),
              updated_at = $2
          FROM (
              SELECT
                  COUNT(sent_at)::int AS sent,
                  COUNT(delivered_at)::int AS delivered,
                  COUNT(opened_at)::int AS opened,
                  COUNT(clicked_at)::int AS clicked,
                  COUNT(responded_at)::int AS responded,
                  COUNT(*) FILTER (WHERE status = 'bounced')::int AS bounced,
                  COUNT(*) FILTER (WHERE status = 'unsubscribed')::int AS unsubscribed,
                  COUNT(converted_at)::int AS converted,
                  COALESCE(SUM(conversion_value), 0) AS revenue
              FROM engagement_records WHERE campaign_id = $1
          ) agg
          WHERE campaigns.id = $1",
    )
    .bind::<SqlUuid, _>(campaign_id)
    .bind::<Timestamptz, _>(Utc::now())
    .execute(db_conn)
    .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

    Ok(())
}

#[derive(QueryableByName)]
struct SnapshotRow {
    #[diesel(sql_type = Timestamptz)]
    metric_date: DateTime<Utc>,
    #[diesel(sql_type = Integer)]
    emails_sent: i32,
    #[diesel(sql_type = Integer)]
    emails_delivered: i32,
    #[diesel(sql_type = Integer)]
    emails_opened: i32,
    #[diesel(sql_type = Integer)]
    emails_clicked: i32,
    #[diesel(sql_type = Integer)]
    conversions: i32,
}

#[derive(QueryableByName)]
struct PerformerRow {
    #[diesel(sql_type = Nullable<SqlUuid>)]
    contact_id: Option<Uuid>,
    #[diesel(sql_type = Nullable<SqlUuid>)]
    prospect_id: Option<Uuid>,
    #[diesel(sql_type = Text)]
    status: String,
    #[diesel(sql_type = Integer)]
    open_count: i32,
    #[diesel(sql_type = Integer)]
    click_count: i32,
    #[diesel(sql_type = Nullable<Text>)]
    first_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    last_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    email: Option<String>,
}

#[derive(QueryableByName)]
struct ConversionRow {
    #[diesel(sql_type = SqlUuid)]
    id: Uuid,
    #[diesel(sql_type = Nullable<SqlUuid>)]
    contact_id: Option<Uuid>,
    #[diesel(sql_type = Nullable<SqlUuid>)]
    prospect_id: Option<Uuid>,
    #[diesel(sql_type = Nullable<SqlUuid>)]
    deal_id: Option<Uuid>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    converted_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Numeric>)]
    conversion_value: Option<BigDecimal>,
}

#[derive(QueryableByName)]
struct StatisticsRow {
    #[diesel(sql_type = BigInt)]
    total_campaigns: i64,
    #[diesel(sql_type = BigInt)]
    draft_campaigns: i64,
    #[diesel(sql_type = BigInt)]
    active_campaigns: i64,
    #[diesel(sql_type = BigInt)]
    completed_campaigns: i64,
    #[diesel(sql_type = diesel::sql_types::Double)]
    total_budget: f64,
    #[diesel(sql_type = diesel::sql_types::Double)]
    total_spent: f64,
    #[diesel(sql_type = diesel::sql_types::Double)]
    total_revenue: f64,
    #[diesel(sql_type = BigInt)]
    total_prospects: i64,
    #[diesel(sql_type = BigInt)]
    total_conversions: i64,
    #[diesel(sql_type = BigInt)]
    total_delivered: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::FromPrimitive;

    #[test]
    fn rates_are_zero_when_denominator_is_zero() {
        assert_eq!(rate_pct(5, 0), 0.0);
        assert_eq!(rate_pct(0, 0), 0.0);
    }

    #[test]
    fn open_rate_uses_delivered_as_base() {
        // 80 delivered of 100 sent, 20 opened: 25% open rate, 80% delivery.
        assert_eq!(rate_pct(80, 100), 80.0);
        assert_eq!(rate_pct(20, 80), 25.0);
    }

    #[test]
    fn roi_is_profit_over_cost() {
        let revenue = BigDecimal::from_f64(1500.0).unwrap();
        let cost = BigDecimal::from_f64(1000.0).unwrap();
        assert_eq!(roi_pct(&revenue, &cost), 50.0);

        let zero = BigDecimal::from(0);
        assert_eq!(roi_pct(&revenue, &zero), 0.0);
    }
}
