use super::audience::ensure_campaign_exists;
use super::engagement::{
    ensure_member_of, load_record, persist_tracking_fields, EngagementRow, ENGAGEMENT_COLUMNS,
};
use super::error::CampaignError;
use super::metrics::recompute_counters;
use super::service::load_campaign;
use super::types::{
    Campaign, EmailTemplate, ExecuteRequest, ExecutionResult, ExecutionStatus,
};
use crate::config::EmailConfig;
use crate::merge;
use crate::outbound::{EmailTransport, OutboundEmail};
use crate::shared::utils::DbPool;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text, Timestamptz, Uuid as SqlUuid};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Pause between consecutive sends so a big audience does not hammer the
/// SMTP relay.
const SEND_DELAY_MS: u64 = 100;

/// Drives a campaign through its send run: resolves the template, walks the
/// pending audience, hands each message to the transport, and records the
/// outcome on the engagement record. One bad address never aborts the run.
pub struct CampaignExecutor {
    conn: DbPool,
    transport: Arc<dyn EmailTransport>,
    email_config: EmailConfig,
}

impl CampaignExecutor {
    pub fn new(
        conn: DbPool,
        transport: Arc<dyn EmailTransport>,
        email_config: EmailConfig,
    ) -> Self {
        Self {
            conn,
            transport,
            email_config,
        }
    }

    pub async fn execute(
        &self,
        campaign_id: Uuid,
        req: &ExecuteRequest,
    ) -> Result<ExecutionResult, CampaignError> {
        let (campaign, pending_count) = {
            let mut db_conn = self
                .conn
                .get()
                .map_err(|_| CampaignError::DatabaseConnection)?;
            let campaign = load_campaign(&mut db_conn, campaign_id)?;
            let pending_count = count_pending(&mut db_conn, campaign_id)?;
            (campaign, pending_count)
        };

        if !campaign.status.is_executable() {
            return Err(CampaignError::InvalidState(format!(
                "Campaign in status {} cannot be executed",
                campaign.status
            )));
        }

        let template = self.resolve_template(&campaign)?;

        // A full execute with nobody to send to is a caller mistake; it must
        // not activate the campaign or touch any record.
        ensure_pending_audience(pending_count)?;

        if req.send_test_email {
            return self.send_test(&campaign, &template, &req.test_email_recipients);
        }

        if let Some(when) = req.schedule_for {
            if when <= Utc::now() {
                return Err(CampaignError::InvalidInput(
                    "schedule_for must be in the future".to_string(),
                ));
            }
            let mut db_conn = self
                .conn
                .get()
                .map_err(|_| CampaignError::DatabaseConnection)?;
            diesel::sql_query(
                "UPDATE campaigns SET status = 'scheduled', start_date = $2, updated_at = $3
                 WHERE id = $1",
            )
            .bind::<SqlUuid, _>(campaign_id)
            .bind::<Timestamptz, _>(when)
            .bind::<Timestamptz, _>(Utc::now())
            .execute(&mut db_conn)
            .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

            info!("Campaign {campaign_id} scheduled for {when}");
            return Ok(ExecutionResult {
                campaign_id,
                status: ExecutionStatus::Scheduled,
                sent_count: 0,
                attempted_count: 0,
                message: format!("Campaign scheduled for {when}"),
            });
        }

        {
            let mut db_conn = self
                .conn
                .get()
                .map_err(|_| CampaignError::DatabaseConnection)?;
            let now = Utc::now();
            diesel::sql_query(
                "UPDATE campaigns SET status = 'active',
                     actual_start_date = COALESCE(actual_start_date, $2),
                     last_executed_at = $2, updated_at = $2
                 WHERE id = $1",
            )
            .bind::<SqlUuid, _>(campaign_id)
            .bind::<Timestamptz, _>(now)
            .execute(&mut db_conn)
            .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;
        }

        let (sent, attempted) = self.send_batch(&campaign, &template).await?;

        info!("Campaign {campaign_id} executed: {sent}/{attempted} sent");
        Ok(ExecutionResult {
            campaign_id,
            status: ExecutionStatus::Executed,
            sent_count: sent,
            attempted_count: attempted,
            message: format!("Campaign executed, {sent} of {attempted} emails sent"),
        })
    }

    /// Sends to any audience member still pending, without changing the
    /// campaign status. The campaign must already be in a sendable state.
    pub async fn send_pending(&self, campaign_id: Uuid) -> Result<ExecutionResult, CampaignError> {
        let campaign = {
            let mut db_conn = self
                .conn
                .get()
                .map_err(|_| CampaignError::DatabaseConnection)?;
            load_campaign(&mut db_conn, campaign_id)?
        };

        if !campaign.status.is_executable() {
            return Err(CampaignError::InvalidState(format!(
                "Campaign in status {} cannot send",
                campaign.status
            )));
        }

        let template = self.resolve_template(&campaign)?;
        let (sent, attempted) = self.send_batch(&campaign, &template).await?;

        if attempted == 0 {
            return Ok(ExecutionResult {
                campaign_id,
                status: ExecutionStatus::NoPending,
                sent_count: 0,
                attempted_count: 0,
                message: "No pending recipients".to_string(),
            });
        }

        Ok(ExecutionResult {
            campaign_id,
            status: ExecutionStatus::Sent,
            sent_count: sent,
            attempted_count: attempted,
            message: format!("{sent} of {attempted} pending emails sent"),
        })
    }

    /// Resets one member's engagement record and sends again, regardless of
    /// how far through the funnel they got.
    pub async fn resend_member(
        &self,
        campaign_id: Uuid,
        engagement_id: Uuid,
    ) -> Result<ExecutionResult, CampaignError> {
        let campaign = {
            let mut db_conn = self
                .conn
                .get()
                .map_err(|_| CampaignError::DatabaseConnection)?;
            load_campaign(&mut db_conn, campaign_id)?
        };

        if !campaign.status.is_executable() {
            return Err(CampaignError::InvalidState(format!(
                "Campaign in status {} cannot resend",
                campaign.status
            )));
        }

        let template = self.resolve_template(&campaign)?;

        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        let mut record = load_record(&mut db_conn, engagement_id)?;
        ensure_member_of(&record, campaign_id)?;

        record.reset_for_resend(Utc::now());
        persist_tracking_fields(&mut db_conn, &record)?;

        let pending = self.load_pending_recipient(&mut db_conn, engagement_id)?;
        let sent = self.send_one(&mut db_conn, &campaign, &template, &pending)?;
        recompute_counters(&mut db_conn, campaign_id)?;

        Ok(ExecutionResult {
            campaign_id,
            status: if sent {
                ExecutionStatus::Resent
            } else {
                ExecutionStatus::Failed
            },
            sent_count: i32::from(sent),
            attempted_count: 1,
            message: if sent {
                "Email resent".to_string()
            } else {
                "Resend failed".to_string()
            },
        })
    }

    fn send_test(
        &self,
        campaign: &Campaign,
        template: &EmailTemplate,
        recipients: &[String],
    ) -> Result<ExecutionResult, CampaignError> {
        if recipients.is_empty() {
            return Err(CampaignError::InvalidInput(
                "No test recipients provided".to_string(),
            ));
        }

        let values = sample_merge_values();
        let body = merge::render(&template.body, &values);
        let subject = format!("[TEST] {}", merge::render(&template.subject, &values));

        let mut sent = 0;
        for to in recipients {
            let mail = self.build_mail(campaign, to, &subject, &body);
            match self.transport.send(&mail) {
                Ok(()) => sent += 1,
                Err(e) => warn!("Test email to {to} failed: {e}"),
            }
        }

        info!("Campaign {} test send: {sent}/{}", campaign.id, recipients.len());
        Ok(ExecutionResult {
            campaign_id: campaign.id,
            status: ExecutionStatus::TestSent,
            sent_count: sent,
            attempted_count: recipients.len() as i32,
            message: format!("Test email sent to {sent} recipients"),
        })
    }

    async fn send_batch(
        &self,
        campaign: &Campaign,
        template: &EmailTemplate,
    ) -> Result<(i32, i32), CampaignError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        let pending = self.load_pending_recipients(&mut db_conn, campaign.id)?;
        let attempted = pending.len() as i32;
        let mut sent = 0;

        for (i, recipient) in pending.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(SEND_DELAY_MS)).await;
            }
            if self.send_one(&mut db_conn, campaign, template, recipient)? {
                sent += 1;
            }
        }

        recompute_counters(&mut db_conn, campaign.id)?;
        super::metrics::record_snapshot_conn(&mut db_conn, campaign.id)?;
        Ok((sent, attempted))
    }

    /// Sends to one pending recipient. A recipient with no email address is
    /// skipped and stays pending; a transport failure bounces the record.
    /// Only an infrastructure error propagates.
    fn send_one(
        &self,
        db_conn: &mut PgConnection,
        campaign: &Campaign,
        template: &EmailTemplate,
        recipient: &PendingRecipient,
    ) -> Result<bool, CampaignError> {
        let Some(email) = recipient.email.as_deref().filter(|e| !e.is_empty()) else {
            warn!(
                "Engagement {} has no email address, leaving pending",
                recipient.engagement_id
            );
            return Ok(false);
        };

        let values = recipient.merge_values();
        let body = merge::render(&template.body, &values);
        let subject = merge::render(&template.subject, &values);
        let mail = self.build_mail(campaign, email, &subject, &body);

        let row: EngagementRow = diesel::sql_query(format!(
            "SELECT {ENGAGEMENT_COLUMNS} FROM engagement_records WHERE id = $1"
        ))
        .bind::<SqlUuid, _>(recipient.engagement_id)
        .get_result(db_conn)
        .map_err(|_| CampaignError::MemberNotFound)?;
        let mut record = row.into_record()?;

        let now = Utc::now();
        let outcome = self.transport.send(&mail);
        match &outcome {
            Ok(()) => {
                let message_id = Uuid::new_v4().to_string();
                record.mark_sent(now, email, Some(&message_id), Some(&subject));
            }
            Err(e) => {
                warn!("Send to {email} failed: {e}");
                let error = e.to_string();
                record.mark_bounced(now, e.bounce_type(), Some(&error));
            }
        }
        persist_tracking_fields(db_conn, &record)?;
        Ok(outcome.is_ok())
    }

    fn build_mail(
        &self,
        campaign: &Campaign,
        to: &str,
        subject: &str,
        body: &str,
    ) -> OutboundEmail {
        OutboundEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            html_body: body.to_string(),
            from_email: campaign
                .email_from_email
                .clone()
                .unwrap_or_else(|| self.email_config.from_email.clone()),
            from_name: campaign
                .email_from_name
                .clone()
                .unwrap_or_else(|| self.email_config.from_name.clone()),
        }
    }

    fn resolve_template(&self, campaign: &Campaign) -> Result<EmailTemplate, CampaignError> {
        let template_id = template_id_for(campaign.email_template_id)?;

        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| CampaignError::DatabaseConnection)?;

        let row: TemplateRow = diesel::sql_query(
            "SELECT id, name, subject, body FROM email_templates WHERE id = $1",
        )
        .bind::<SqlUuid, _>(template_id)
        .get_result(&mut db_conn)
        .map_err(|_| {
            CampaignError::InvalidInput("Campaign email template does not exist".to_string())
        })?;

        Ok(row.into_template(campaign.email_subject.as_deref()))
    }

    fn load_pending_recipients(
        &self,
        db_conn: &mut PgConnection,
        campaign_id: Uuid,
    ) -> Result<Vec<PendingRecipient>, CampaignError> {
        ensure_campaign_exists(db_conn, campaign_id)?;

        let rows: Vec<PendingRow> = diesel::sql_query(format!(
            "{PENDING_RECIPIENT_SQL} WHERE e.campaign_id = $1 AND e.status = 'pending'
             ORDER BY e.created_at ASC"
        ))
        .bind::<SqlUuid, _>(campaign_id)
        .load(db_conn)
        .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;

        Ok(rows.into_iter().map(PendingRow::into_recipient).collect())
    }

    fn load_pending_recipient(
        &self,
        db_conn: &mut PgConnection,
        engagement_id: Uuid,
    ) -> Result<PendingRecipient, CampaignError> {
        let row: PendingRow =
            diesel::sql_query(format!("{PENDING_RECIPIENT_SQL} WHERE e.id = $1"))
                .bind::<SqlUuid, _>(engagement_id)
                .get_result(db_conn)
                .map_err(|_| CampaignError::MemberNotFound)?;
        Ok(row.into_recipient())
    }
}

/// A campaign without a template cannot send anything; the request is bad,
/// not the campaign state.
fn template_id_for(template_id: Option<Uuid>) -> Result<Uuid, CampaignError> {
    template_id.ok_or_else(|| {
        CampaignError::InvalidInput("Campaign has no email template configured".to_string())
    })
}

fn ensure_pending_audience(pending_count: i64) -> Result<(), CampaignError> {
    if pending_count == 0 {
        return Err(CampaignError::InvalidInput(
            "Campaign has no audience members to send to".to_string(),
        ));
    }
    Ok(())
}

fn count_pending(db_conn: &mut PgConnection, campaign_id: Uuid) -> Result<i64, CampaignError> {
    #[derive(QueryableByName)]
    struct CountRow {
        #[diesel(sql_type = diesel::sql_types::BigInt)]
        n: i64,
    }

    let row: CountRow = diesel::sql_query(
        "SELECT COUNT(*) AS n FROM engagement_records
         WHERE campaign_id = $1 AND status = 'pending'",
    )
    .bind::<SqlUuid, _>(campaign_id)
    .get_result(db_conn)
    .map_err(|e| CampaignError::QueryFailed(e.to_string()))?;
    Ok(row.n)
}

#[derive(QueryableByName)]
struct TemplateRow {
    #[diesel(sql_type = SqlUuid)]
    id: Uuid,
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Text)]
    subject: String,
    #[diesel(sql_type = Text)]
    body: String,
}

impl TemplateRow {
    fn into_template(self, subject_override: Option<&str>) -> EmailTemplate {
        EmailTemplate {
            id: self.id,
            name: self.name,
            // The campaign's own subject line wins over the template's.
            subject: subject_override
                .map(str::to_string)
                .unwrap_or(self.subject),
            body: self.body,
        }
    }
}

const PENDING_RECIPIENT_SQL: &str = r"SELECT e.id AS engagement_id,
           COALESCE(e.email_sent_to, c.email, p.email) AS email,
           COALESCE(c.first_name, p.first_name) AS first_name,
           COALESCE(c.last_name, p.last_name) AS last_name,
           COALESCE(co.name, p.company) AS company,
           COALESCE(c.position, p.job_title) AS job_title
    FROM engagement_records e
    LEFT JOIN contacts c ON c.id = e.contact_id
    LEFT JOIN companies co ON co.id = c.company_id
    LEFT JOIN prospects p ON p.id = e.prospect_id";

#[derive(QueryableByName)]
struct PendingRow {
    #[diesel(sql_type = SqlUuid)]
    engagement_id: Uuid,
    #[diesel(sql_type = Nullable<Text>)]
    email: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    first_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    last_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    company: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    job_title: Option<String>,
}

impl PendingRow {
    fn into_recipient(self) -> PendingRecipient {
        PendingRecipient {
            engagement_id: self.engagement_id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            company: self.company,
            job_title: self.job_title,
        }
    }
}

struct PendingRecipient {
    engagement_id: Uuid,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    company: Option<String>,
    job_title: Option<String>,
}

impl PendingRecipient {
    fn merge_values(&self) -> HashMap<String, String> {
        let first = self.first_name.clone().unwrap_or_default();
        let last = self.last_name.clone().unwrap_or_default();
        let name = format!("{first} {last}").trim().to_string();

        let mut values = HashMap::new();
        values.insert("first_name".to_string(), first);
        values.insert("last_name".to_string(), last);
        values.insert("name".to_string(), name);
        values.insert(
            "email".to_string(),
            self.email.clone().unwrap_or_default(),
        );
        values.insert(
            "company".to_string(),
            self.company.clone().unwrap_or_default(),
        );
        values.insert(
            "job_title".to_string(),
            self.job_title.clone().unwrap_or_default(),
        );
        values
    }
}

fn sample_merge_values() -> HashMap<String, String> {
    let mut values = HashMap::new();
    values.insert("first_name".to_string(), "Jane".to_string());
    values.insert("last_name".to_string(), "Example".to_string());
    values.insert("name".to_string(), "Jane Example".to_string());
    values.insert("email".to_string(), "jane@example.com".to_string());
    values.insert("company".to_string(), "Example Corp".to_string());
    values.insert("job_title".to_string(), "Head of Examples".to_string());
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pending_audience_is_a_validation_error() {
        assert!(matches!(
            ensure_pending_audience(0),
            Err(CampaignError::InvalidInput(_))
        ));
        assert!(ensure_pending_audience(3).is_ok());
    }

    #[test]
    fn missing_template_is_a_validation_error() {
        assert!(matches!(
            template_id_for(None),
            Err(CampaignError::InvalidInput(_))
        ));
        let id = Uuid::new_v4();
        assert_eq!(template_id_for(Some(id)).ok(), Some(id));
    }

    #[test]
    fn campaign_subject_overrides_template_subject() {
        let row = TemplateRow {
            id: Uuid::new_v4(),
            name: "Welcome".to_string(),
            subject: "Hello {{first_name}}".to_string(),
            body: "<p>Hi</p>".to_string(),
        };
        let template = row.into_template(Some("Special offer"));
        assert_eq!(template.subject, "Special offer");

        let row = TemplateRow {
            id: Uuid::new_v4(),
            name: "Welcome".to_string(),
            subject: "Hello {{first_name}}".to_string(),
            body: "<p>Hi</p>".to_string(),
        };
        assert_eq!(row.into_template(None).subject, "Hello {{first_name}}");
    }

    #[test]
    fn merge_values_compose_full_name() {
        let recipient = PendingRecipient {
            engagement_id: Uuid::new_v4(),
            email: Some("ada@acme.test".to_string()),
            first_name: Some("Ada".to_string()),
            last_name: None,
            company: Some("Acme".to_string()),
            job_title: None,
        };
        let values = recipient.merge_values();
        assert_eq!(values["name"], "Ada");
        assert_eq!(values["company"], "Acme");
        assert_eq!(values["job_title"], "");
    }
}
