use super::error::ProspectError;
use super::service::load_prospect;
use super::types::{ConversionRequest, ConversionResult, Prospect};
use crate::directory::{
    find_company_by_name, find_contact_by_email, insert_activity, insert_contact, NewActivity,
    NewContact,
};
use crate::shared::utils::DbPool;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::{Text, Timestamptz, Uuid as SqlUuid};
use log::info;
use uuid::Uuid;

/// Turns a qualified prospect into a contact. The whole flow runs in one
/// transaction: contact creation, prospect state change, the optional
/// activity entry, and re-pointing the prospect's engagement records at the
/// new contact all land or none do.
pub struct ProspectConverter {
    conn: DbPool,
}

impl ProspectConverter {
    pub fn new(conn: DbPool) -> Self {
        Self { conn }
    }

    pub fn convert(
        &self,
        prospect_id: Uuid,
        request: &ConversionRequest,
        converted_by: Uuid,
    ) -> Result<ConversionResult, ProspectError> {
        let mut db_conn = self
            .conn
            .get()
            .map_err(|_| ProspectError::DatabaseConnection)?;

        let result = db_conn.transaction::<ConversionResult, ProspectError, _>(|conn| {
            let prospect = load_prospect(conn, prospect_id)?;

            if prospect.is_converted() {
                return Err(ProspectError::AlreadyConverted);
            }

            if let Some(email) = prospect.email.as_deref().filter(|e| !e.is_empty()) {
                if find_contact_by_email(conn, email)?.is_some() {
                    return Err(ProspectError::Conflict(format!(
                        "Contact with email '{email}' already exists"
                    )));
                }
            }

            let contact_id = create_contact_from(conn, &prospect, request, converted_by)?;
            mark_converted(conn, prospect_id, contact_id)?;

            let activity_id = if request.create_activity {
                Some(log_conversion_activity(
                    conn,
                    &prospect,
                    contact_id,
                    converted_by,
                    request.notes.as_deref(),
                )?)
            } else {
                None
            };

            relink_engagements(conn, prospect_id, contact_id)?;

            Ok(ConversionResult {
                prospect_id,
                contact_id,
                activity_id,
                message: "Prospect successfully converted to contact".to_string(),
            })
        })?;

        info!(
            "Converted prospect {prospect_id} to contact {}",
            result.contact_id
        );
        Ok(result)
    }
}

fn create_contact_from(
    conn: &mut PgConnection,
    prospect: &Prospect,
    request: &ConversionRequest,
    converted_by: Uuid,
) -> Result<Uuid, ProspectError> {
    let company_id = match prospect.company.as_deref().filter(|c| !c.is_empty()) {
        Some(name) => find_company_by_name(conn, name)?.map(|c| c.id),
        None => None,
    };

    let notes = format!(
        "Converted from prospect. Original notes: {}",
        prospect.notes.as_deref().unwrap_or("None")
    );

    let owner_id = request
        .assign_to
        .or(prospect.assigned_to)
        .unwrap_or(converted_by);

    let contact = NewContact {
        first_name: prospect.first_name.clone(),
        last_name: prospect.last_name.clone(),
        email: prospect.email.clone(),
        phone: prospect.phone.clone(),
        // Prospects carry a single number; it doubles as mobile.
        mobile: prospect.phone.clone(),
        position: prospect.job_title.clone(),
        company_id,
        notes: Some(notes),
        status: "lead".to_string(),
        owner_id: Some(owner_id),
    };

    Ok(insert_contact(conn, &contact)?)
}

fn mark_converted(
    conn: &mut PgConnection,
    prospect_id: Uuid,
    contact_id: Uuid,
) -> Result<(), ProspectError> {
    diesel::sql_query(
        "UPDATE prospects SET status = 'converted', converted_to_contact_id = $2,
             converted_at = $3, updated_at = $3
         WHERE id = $1",
    )
    .bind::<SqlUuid, _>(prospect_id)
    .bind::<SqlUuid, _>(contact_id)
    .bind::<Timestamptz, _>(Utc::now())
    .execute(conn)
    .map_err(|e| ProspectError::QueryFailed(e.to_string()))?;
    Ok(())
}

fn log_conversion_activity(
    conn: &mut PgConnection,
    prospect: &Prospect,
    contact_id: Uuid,
    converted_by: Uuid,
    notes: Option<&str>,
) -> Result<Uuid, ProspectError> {
    let campaign_name = campaign_name(conn, prospect.campaign_id)?;
    let description = conversion_activity_description(
        &prospect.full_name(),
        campaign_name.as_deref(),
        notes,
    );

    let activity = NewActivity {
        activity_type: "note".to_string(),
        subject: "Prospect converted to contact".to_string(),
        description: Some(description),
        contact_id: Some(contact_id),
        user_id: Some(converted_by),
    };

    Ok(insert_activity(conn, &activity)?)
}

/// The activity names the originating campaign so the conversion can be
/// traced back from the contact's history.
fn conversion_activity_description(
    full_name: &str,
    campaign_name: Option<&str>,
    notes: Option<&str>,
) -> String {
    format!(
        "Prospect {full_name} was converted to a contact. Campaign source: {}. {}",
        campaign_name.unwrap_or("N/A"),
        notes.unwrap_or("")
    )
    .trim_end()
    .to_string()
}

fn campaign_name(
    conn: &mut PgConnection,
    campaign_id: Option<Uuid>,
) -> Result<Option<String>, ProspectError> {
    let Some(campaign_id) = campaign_id else {
        return Ok(None);
    };

    #[derive(QueryableByName)]
    struct NameRow {
        #[diesel(sql_type = Text)]
        name: String,
    }

    let rows: Vec<NameRow> = diesel::sql_query("SELECT name FROM campaigns WHERE id = $1")
        .bind::<SqlUuid, _>(campaign_id)
        .load(conn)
        .map_err(|e| ProspectError::QueryFailed(e.to_string()))?;
    Ok(rows.into_iter().next().map(|r| r.name))
}

/// Engagement history follows the person: every record that tracked the
/// prospect now tracks the contact instead.
fn relink_engagements(
    conn: &mut PgConnection,
    prospect_id: Uuid,
    contact_id: Uuid,
) -> Result<usize, ProspectError> {
    let relinked = diesel::sql_query(
        "UPDATE engagement_records SET contact_id = $2, prospect_id = NULL, updated_at = $3
         WHERE prospect_id = $1",
    )
    .bind::<SqlUuid, _>(prospect_id)
    .bind::<SqlUuid, _>(contact_id)
    .bind::<Timestamptz, _>(Utc::now())
    .execute(conn)
    .map_err(|e| ProspectError::QueryFailed(e.to_string()))?;
    Ok(relinked)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_description_names_the_source_campaign() {
        let description = conversion_activity_description(
            "Ada Lovelace",
            Some("Q3 Outreach"),
            Some("Ready to buy"),
        );
        assert_eq!(
            description,
            "Prospect Ada Lovelace was converted to a contact. Campaign source: Q3 Outreach. Ready to buy"
        );
    }

    #[test]
    fn activity_description_without_campaign_says_na() {
        let description = conversion_activity_description("Ada Lovelace", None, None);
        assert_eq!(
            description,
            "Prospect Ada Lovelace was converted to a contact. Campaign source: N/A."
        );
    }
}
