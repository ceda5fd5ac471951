//! Prospect capture, lead scoring, and conversion into contacts.

mod convert;
mod error;
mod handlers;
mod migration;
mod scoring;
mod service;
mod types;

pub use convert::*;
pub use error::*;
pub use handlers::*;
pub use migration::*;
pub use scoring::{apply_score_change, LeadScoreTracker, MAX_LEAD_SCORE, MIN_LEAD_SCORE};
pub use service::ProspectService;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_prospect() -> Prospect {
        let now = Utc::now();
        Prospect {
            id: Uuid::new_v4(),
            first_name: "Grace".to_string(),
            last_name: Some("Hopper".to_string()),
            email: Some("grace@example.com".to_string()),
            phone: None,
            company: None,
            job_title: None,
            industry: None,
            description: None,
            notes: None,
            source: ProspectSource::WebForm,
            source_details: None,
            status: ProspectStatus::New,
            lead_score: 0,
            campaign_id: None,
            converted_to_contact_id: None,
            converted_at: None,
            assigned_to: None,
            created_by: None,
            last_contacted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_prospect_status_display() {
        assert_eq!(ProspectStatus::New.to_string(), "new");
        assert_eq!(ProspectStatus::Converted.to_string(), "converted");
        assert_eq!(ProspectStatus::Rejected.to_string(), "rejected");
    }

    #[test]
    fn test_prospect_source_round_trip() {
        for source in [
            ProspectSource::EmailCampaign,
            ProspectSource::WebForm,
            ProspectSource::Phone,
            ProspectSource::SocialMedia,
            ProspectSource::ManualEntry,
            ProspectSource::Referral,
            ProspectSource::Other,
        ] {
            let parsed: ProspectSource = source.to_string().parse().unwrap();
            assert_eq!(parsed, source);
        }
    }

    #[test]
    fn test_full_name_skips_missing_last_name() {
        let mut prospect = sample_prospect();
        assert_eq!(prospect.full_name(), "Grace Hopper");
        prospect.last_name = None;
        assert_eq!(prospect.full_name(), "Grace");
    }

    #[test]
    fn test_conversion_requires_status_and_contact_link() {
        let mut prospect = sample_prospect();
        assert!(!prospect.is_converted());

        // Status alone is not enough.
        prospect.status = ProspectStatus::Converted;
        assert!(!prospect.is_converted());

        prospect.converted_to_contact_id = Some(Uuid::new_v4());
        assert!(prospect.is_converted());
    }

    #[test]
    fn test_prospect_error_display() {
        assert_eq!(ProspectError::NotFound.to_string(), "Prospect not found");
        assert_eq!(
            ProspectError::AlreadyConverted.to_string(),
            "Prospect has already been converted to a contact"
        );
    }
}
