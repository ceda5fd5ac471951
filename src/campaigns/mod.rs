//! Campaign lifecycle: CRUD, audience membership, execution, engagement
//! tracking, and derived metrics.

mod audience;
mod engagement;
mod error;
mod executor;
mod handlers;
mod metrics;
mod migration;
mod service;
mod types;

pub use audience::*;
pub use engagement::EngagementTracker;
pub use error::*;
pub use executor::*;
pub use handlers::*;
pub use metrics::{metrics_response, rate_pct, roi_pct, MetricsAggregator};
pub use migration::*;
pub use service::CampaignService;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_campaign_status_display() {
        assert_eq!(CampaignStatus::Draft.to_string(), "draft");
        assert_eq!(CampaignStatus::Scheduled.to_string(), "scheduled");
        assert_eq!(CampaignStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_campaign_status_executable() {
        assert!(CampaignStatus::Draft.is_executable());
        assert!(CampaignStatus::Scheduled.is_executable());
        assert!(CampaignStatus::Active.is_executable());
        assert!(!CampaignStatus::Paused.is_executable());
        assert!(!CampaignStatus::Completed.is_executable());
        assert!(!CampaignStatus::Cancelled.is_executable());
    }

    #[test]
    fn test_engagement_status_round_trip() {
        for status in [
            EngagementStatus::Pending,
            EngagementStatus::Sent,
            EngagementStatus::Delivered,
            EngagementStatus::Opened,
            EngagementStatus::Clicked,
            EngagementStatus::Responded,
            EngagementStatus::Converted,
            EngagementStatus::Bounced,
            EngagementStatus::Unsubscribed,
        ] {
            let parsed: EngagementStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_stage_ranks_are_monotone_through_funnel() {
        assert!(
            EngagementStatus::Sent.stage_rank() < EngagementStatus::Delivered.stage_rank()
        );
        assert!(
            EngagementStatus::Delivered.stage_rank() < EngagementStatus::Opened.stage_rank()
        );
        assert!(EngagementStatus::Opened.stage_rank() < EngagementStatus::Clicked.stage_rank());
    }

    #[test]
    fn test_add_member_request_payload_shape() {
        let id = uuid::Uuid::new_v4();
        let req: AddMemberRequest = serde_json::from_str(&format!(
            r#"{{"recipient_type": "prospect", "recipient_id": "{id}", "email": "alt@acme.test"}}"#
        ))
        .unwrap();
        assert_eq!(req.recipient, Recipient::Prospect(id));
        assert_eq!(req.email.as_deref(), Some("alt@acme.test"));

        let req: AddMemberRequest = serde_json::from_str(&format!(
            r#"{{"recipient_type": "contact", "recipient_id": "{id}"}}"#
        ))
        .unwrap();
        assert_eq!(req.recipient, Recipient::Contact(id));
        assert_eq!(req.email, None);
    }

    #[test]
    fn test_campaign_error_display() {
        assert_eq!(CampaignError::NotFound.to_string(), "Campaign not found");
        assert_eq!(
            CampaignError::InvalidState("draft only".to_string()).to_string(),
            "Invalid state: draft only"
        );
    }
}
