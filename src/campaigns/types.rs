use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignType {
    Email,
    WebForm,
    Phone,
    SocialMedia,
    ManualEntry,
    Event,
    Other,
}

impl std::fmt::Display for CampaignType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::WebForm => write!(f, "web_form"),
            Self::Phone => write!(f, "phone"),
            Self::SocialMedia => write!(f, "social_media"),
            Self::ManualEntry => write!(f, "manual_entry"),
            Self::Event => write!(f, "event"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for CampaignType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "web_form" => Ok(Self::WebForm),
            "phone" => Ok(Self::Phone),
            "social_media" => Ok(Self::SocialMedia),
            "manual_entry" => Ok(Self::ManualEntry),
            "event" => Ok(Self::Event),
            "other" => Ok(Self::Other),
            other => Err(format!("Unknown campaign type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl CampaignStatus {
    /// Only these statuses may be executed or sent to.
    pub fn is_executable(self) -> bool {
        matches!(self, Self::Draft | Self::Scheduled | Self::Active)
    }
}

impl Default for CampaignStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "scheduled" => Ok(Self::Scheduled),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("Unknown campaign status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub campaign_type: CampaignType,
    pub status: CampaignStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub actual_start_date: Option<DateTime<Utc>>,
    pub actual_end_date: Option<DateTime<Utc>>,
    pub budget: BigDecimal,
    pub actual_cost: BigDecimal,
    pub expected_revenue: Option<BigDecimal>,
    pub actual_revenue: BigDecimal,
    pub target_audience_size: i32,
    pub target_response_rate: Option<BigDecimal>,
    pub target_conversion_rate: Option<BigDecimal>,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub opened_count: i32,
    pub clicked_count: i32,
    pub responded_count: i32,
    pub bounced_count: i32,
    pub unsubscribed_count: i32,
    pub converted_count: i32,
    pub prospects_generated: i32,
    pub email_template_id: Option<Uuid>,
    pub email_subject: Option<String>,
    pub email_from_name: Option<String>,
    pub email_from_email: Option<String>,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub owner_id: Uuid,
    pub created_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_executed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementStatus {
    Pending,
    Sent,
    Delivered,
    Opened,
    Clicked,
    Responded,
    Converted,
    Bounced,
    Unsubscribed,
}

impl EngagementStatus {
    /// Ordering used by open/click transitions: status only ever moves to a
    /// later stage, never backward. Bounce and unsubscribe outrank the
    /// forward stages so an open recorded after a bounce cannot revive the
    /// record.
    pub fn stage_rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Opened => 3,
            Self::Clicked => 4,
            Self::Responded => 5,
            Self::Converted => 6,
            Self::Bounced => 7,
            Self::Unsubscribed => 8,
        }
    }
}

impl std::fmt::Display for EngagementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Opened => write!(f, "opened"),
            Self::Clicked => write!(f, "clicked"),
            Self::Responded => write!(f, "responded"),
            Self::Converted => write!(f, "converted"),
            Self::Bounced => write!(f, "bounced"),
            Self::Unsubscribed => write!(f, "unsubscribed"),
        }
    }
}

impl std::str::FromStr for EngagementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "opened" => Ok(Self::Opened),
            "clicked" => Ok(Self::Clicked),
            "responded" => Ok(Self::Responded),
            "converted" => Ok(Self::Converted),
            "bounced" => Ok(Self::Bounced),
            "unsubscribed" => Ok(Self::Unsubscribed),
            other => Err(format!("Unknown engagement status: {other}")),
        }
    }
}

/// The one party an engagement record tracks. Exactly one of contact or
/// prospect, enforced here at the type level and by a CHECK constraint in
/// the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "recipient_type", content = "recipient_id")]
pub enum Recipient {
    Contact(Uuid),
    Prospect(Uuid),
}

impl Recipient {
    pub fn contact_id(self) -> Option<Uuid> {
        match self {
            Self::Contact(id) => Some(id),
            Self::Prospect(_) => None,
        }
    }

    pub fn prospect_id(self) -> Option<Uuid> {
        match self {
            Self::Prospect(id) => Some(id),
            Self::Contact(_) => None,
        }
    }
}

/// Join entity between a campaign and one recipient, tracking that
/// recipient's progress through the send lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementRecord {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub prospect_id: Option<Uuid>,
    pub status: EngagementStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    pub converted_at: Option<DateTime<Utc>>,
    pub bounced_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub open_count: i32,
    pub click_count: i32,
    pub email_sent_to: Option<String>,
    pub email_message_id: Option<String>,
    pub email_subject: Option<String>,
    pub deal_id: Option<Uuid>,
    pub conversion_value: Option<BigDecimal>,
    pub error_message: Option<String>,
    pub bounce_type: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---- Request / response shapes ----

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub description: Option<String>,
    pub campaign_type: CampaignType,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub budget: Option<BigDecimal>,
    pub expected_revenue: Option<BigDecimal>,
    pub target_response_rate: Option<BigDecimal>,
    pub target_conversion_rate: Option<BigDecimal>,
    pub email_template_id: Option<Uuid>,
    pub email_subject: Option<String>,
    pub email_from_name: Option<String>,
    pub email_from_email: Option<String>,
    pub tags: Option<Vec<String>>,
    pub category: Option<String>,
    pub owner_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<CampaignStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub budget: Option<BigDecimal>,
    pub actual_cost: Option<BigDecimal>,
    pub expected_revenue: Option<BigDecimal>,
    pub target_response_rate: Option<BigDecimal>,
    pub target_conversion_rate: Option<BigDecimal>,
    pub email_template_id: Option<Uuid>,
    pub email_subject: Option<String>,
    pub email_from_name: Option<String>,
    pub email_from_email: Option<String>,
    pub tags: Option<Vec<String>>,
    pub category: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CampaignListQuery {
    pub search: Option<String>,
    /// Comma-separated status list, e.g. `draft,active`.
    pub status: Option<String>,
    /// Comma-separated type list.
    pub campaign_type: Option<String>,
    pub category: Option<String>,
    pub owner_id: Option<Uuid>,
    /// Campaigns carrying this tag.
    pub tag: Option<String>,
    pub start_date_after: Option<DateTime<Utc>>,
    pub start_date_before: Option<DateTime<Utc>>,
    pub min_budget: Option<BigDecimal>,
    pub max_budget: Option<BigDecimal>,
    pub page: Option<i32>,
    pub per_page: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignListResponse {
    pub campaigns: Vec<Campaign>,
    pub total_count: i64,
    pub page: i32,
    pub per_page: i32,
    pub total_pages: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddAudienceRequest {
    #[serde(default)]
    pub contact_ids: Vec<Uuid>,
    #[serde(default)]
    pub prospect_ids: Vec<Uuid>,
}

/// Per-kind result of one bulk add. A duplicate never fails the batch.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BulkAddResult {
    pub added_count: i32,
    pub skipped_count: i32,
    pub total_requested: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddAudienceResponse {
    pub campaign_id: Uuid,
    pub added_contacts: i32,
    pub added_prospects: i32,
    pub skipped_duplicates: i32,
    pub total_audience: i64,
    pub message: String,
}

/// Single-member add. The optional email overrides the recipient's own
/// stored address for this campaign's sends.
#[derive(Debug, Clone, Deserialize)]
pub struct AddMemberRequest {
    #[serde(flatten)]
    pub recipient: Recipient,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddMemberResponse {
    pub campaign_id: Uuid,
    pub recipient: Recipient,
    pub added: bool,
    pub total_audience: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudienceQuery {
    /// Comma-separated engagement status filter.
    pub status: Option<String>,
    pub page: Option<i32>,
    pub per_page: Option<i32>,
}

/// Audience listing entry, enriched with recipient details.
#[derive(Debug, Clone, Serialize)]
pub struct AudienceMember {
    pub engagement_id: Uuid,
    pub recipient: Recipient,
    pub name: String,
    pub email: Option<String>,
    pub company: Option<String>,
    pub status: EngagementStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    pub converted_at: Option<DateTime<Utc>>,
    pub open_count: i32,
    pub click_count: i32,
    pub engagement_score: i32,
    pub lead_score: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AudienceListResponse {
    pub campaign_id: Uuid,
    pub audience: Vec<AudienceMember>,
    pub total: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub send_test_email: bool,
    #[serde(default)]
    pub test_email_recipients: Vec<String>,
    pub schedule_for: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Executed,
    Sent,
    Scheduled,
    TestSent,
    NoPending,
    Resent,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub campaign_id: Uuid,
    pub status: ExecutionStatus,
    pub sent_count: i32,
    pub attempted_count: i32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignMetricsResponse {
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub opened_count: i32,
    pub clicked_count: i32,
    pub responded_count: i32,
    pub bounced_count: i32,
    pub unsubscribed_count: i32,
    pub converted_count: i32,
    pub prospects_generated: i32,
    pub delivery_rate: f64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub response_rate: f64,
    pub conversion_rate: f64,
    pub bounce_rate: f64,
    pub budget: BigDecimal,
    pub actual_cost: BigDecimal,
    pub actual_revenue: BigDecimal,
    pub roi: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimelineQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelinePoint {
    pub date: DateTime<Utc>,
    pub sent: i32,
    pub delivered: i32,
    pub opened: i32,
    pub clicked: i32,
    pub converted: i32,
    pub open_rate: f64,
    pub click_rate: f64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopPerformer {
    pub recipient: Recipient,
    pub name: String,
    pub email: Option<String>,
    pub engagement_score: i32,
    pub opens: i32,
    pub clicks: i32,
    pub converted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionFunnel {
    pub sent: i32,
    pub delivered: i32,
    pub opened: i32,
    pub clicked: i32,
    pub responded: i32,
    pub converted: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsResponse {
    pub campaign_id: Uuid,
    pub metrics: CampaignMetricsResponse,
    pub time_series: Vec<TimelinePoint>,
    pub top_performers: Vec<TopPerformer>,
    pub conversion_funnel: ConversionFunnel,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionEntry {
    pub engagement_id: Uuid,
    pub deal_id: Uuid,
    pub contact_id: Option<Uuid>,
    pub prospect_id: Option<Uuid>,
    pub converted_at: Option<DateTime<Utc>>,
    pub conversion_value: Option<BigDecimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionsResponse {
    pub campaign_id: Uuid,
    pub conversions: Vec<ConversionEntry>,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkDealRequest {
    pub prospect_id: Uuid,
    pub deal_id: Uuid,
    pub conversion_value: BigDecimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignStatistics {
    pub total_campaigns: i64,
    pub draft_campaigns: i64,
    pub active_campaigns: i64,
    pub completed_campaigns: i64,
    pub total_budget: f64,
    pub total_spent: f64,
    pub total_revenue: f64,
    pub overall_roi: f64,
    pub total_prospects: i64,
    pub total_conversions: i64,
    pub average_conversion_rate: f64,
}

/// Email template row consumed by the executor; template CRUD lives in the
/// wider system.
#[derive(Debug, Clone, Serialize)]
pub struct EmailTemplate {
    pub id: Uuid,
    pub name: String,
    pub subject: String,
    pub body: String,
}
