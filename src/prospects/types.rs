use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::campaigns::EngagementRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProspectStatus {
    /// Just captured, not yet reviewed.
    New,
    /// Moved to the contacts table.
    Converted,
    /// Not a good fit.
    Rejected,
}

impl Default for ProspectStatus {
    fn default() -> Self {
        Self::New
    }
}

impl std::fmt::Display for ProspectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Converted => write!(f, "converted"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for ProspectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "converted" => Ok(Self::Converted),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("Unknown prospect status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProspectSource {
    EmailCampaign,
    WebForm,
    Phone,
    SocialMedia,
    ManualEntry,
    Referral,
    Other,
}

impl Default for ProspectSource {
    fn default() -> Self {
        Self::Other
    }
}

impl std::fmt::Display for ProspectSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmailCampaign => write!(f, "email_campaign"),
            Self::WebForm => write!(f, "web_form"),
            Self::Phone => write!(f, "phone"),
            Self::SocialMedia => write!(f, "social_media"),
            Self::ManualEntry => write!(f, "manual_entry"),
            Self::Referral => write!(f, "referral"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for ProspectSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email_campaign" => Ok(Self::EmailCampaign),
            "web_form" => Ok(Self::WebForm),
            "phone" => Ok(Self::Phone),
            "social_media" => Ok(Self::SocialMedia),
            "manual_entry" => Ok(Self::ManualEntry),
            "referral" => Ok(Self::Referral),
            "other" => Ok(Self::Other),
            other => Err(format!("Unknown prospect source: {other}")),
        }
    }
}

/// A potential lead captured by a campaign, kept separate from contacts
/// until qualified and converted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prospect {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub industry: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub source: ProspectSource,
    pub source_details: Option<String>,
    pub status: ProspectStatus,
    pub lead_score: i32,
    pub campaign_id: Option<Uuid>,
    pub converted_to_contact_id: Option<Uuid>,
    pub converted_at: Option<DateTime<Utc>>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prospect {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {last}", self.first_name),
            None => self.first_name.clone(),
        }
    }

    /// Conversion is a formal state: converted status plus a linked
    /// contact.
    pub fn is_converted(&self) -> bool {
        self.status == ProspectStatus::Converted && self.converted_to_contact_id.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateProspectRequest {
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub industry: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub source: Option<ProspectSource>,
    pub source_details: Option<String>,
    pub lead_score: Option<i32>,
    pub campaign_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProspectRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub industry: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub source: Option<ProspectSource>,
    pub source_details: Option<String>,
    pub status: Option<ProspectStatus>,
    pub lead_score: Option<i32>,
    pub campaign_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub last_contacted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProspectListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub source: Option<String>,
    pub campaign_id: Option<Uuid>,
    pub min_lead_score: Option<i32>,
    pub page: Option<i32>,
    pub per_page: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProspectListResponse {
    pub prospects: Vec<Prospect>,
    pub total_count: i64,
    pub page: i32,
    pub per_page: i32,
    pub total_pages: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkCreateRequest {
    pub prospects: Vec<CreateProspectRequest>,
    pub campaign_id: Option<Uuid>,
    #[serde(default = "default_skip_duplicates")]
    pub skip_duplicates: bool,
}

fn default_skip_duplicates() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkCreateResult {
    pub created_count: i32,
    pub skipped_count: i32,
    pub created_ids: Vec<Uuid>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversionRequest {
    pub notes: Option<String>,
    #[serde(default)]
    pub create_activity: bool,
    pub assign_to: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub prospect_id: Uuid,
    pub contact_id: Uuid,
    pub activity_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeadScoreUpdateRequest {
    pub score_change: i32,
    pub reason: String,
    pub activity_type: Option<String>,
    pub campaign_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadScoreHistoryEntry {
    pub id: Uuid,
    pub prospect_id: Uuid,
    pub old_score: i32,
    pub new_score: i32,
    pub score_change: i32,
    pub reason: String,
    pub activity_type: Option<String>,
    pub campaign_id: Option<Uuid>,
    pub changed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProspectStatisticsQuery {
    pub campaign_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProspectStatistics {
    pub total_prospects: i64,
    pub new_prospects: i64,
    pub converted_prospects: i64,
    pub rejected_prospects: i64,
    pub average_lead_score: f64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProspectWithEngagement {
    pub prospect: Prospect,
    pub engagements: Vec<EngagementRecord>,
    pub total_campaigns: usize,
}
