use super::types::*;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text, Timestamptz, Uuid as DieselUuid};
use uuid::Uuid;

#[derive(QueryableByName)]
struct ContactRow {
    #[diesel(sql_type = DieselUuid)]
    id: Uuid,
    #[diesel(sql_type = Nullable<DieselUuid>)]
    owner_id: Option<Uuid>,
    #[diesel(sql_type = Text)]
    first_name: String,
    #[diesel(sql_type = Nullable<Text>)]
    last_name: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    email: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    phone: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    mobile: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    position: Option<String>,
    #[diesel(sql_type = Nullable<DieselUuid>)]
    company_id: Option<Uuid>,
    #[diesel(sql_type = Nullable<Text>)]
    notes: Option<String>,
    #[diesel(sql_type = Text)]
    status: String,
    #[diesel(sql_type = Timestamptz)]
    created_at: DateTime<Utc>,
    #[diesel(sql_type = Timestamptz)]
    updated_at: DateTime<Utc>,
}

#[derive(QueryableByName)]
struct CompanyRow {
    #[diesel(sql_type = DieselUuid)]
    id: Uuid,
    #[diesel(sql_type = Text)]
    name: String,
}

const CONTACT_COLUMNS: &str = "id, owner_id, first_name, last_name, email, phone, mobile, \
     position, company_id, notes, status, created_at, updated_at";

/// All functions here take a borrowed connection so callers can compose
/// them inside a single transaction (conversion relies on this).
pub fn find_contact_by_email(
    conn: &mut PgConnection,
    email: &str,
) -> Result<Option<Contact>, diesel::result::Error> {
    let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE email = $1 LIMIT 1");
    let rows: Vec<ContactRow> = diesel::sql_query(sql).bind::<Text, _>(email).load(conn)?;
    Ok(rows.into_iter().next().map(row_to_contact))
}

pub fn insert_contact(
    conn: &mut PgConnection,
    new_contact: &NewContact,
) -> Result<Uuid, diesel::result::Error> {
    let id = Uuid::new_v4();
    diesel::sql_query(
        r#"
        INSERT INTO contacts (
            id, owner_id, first_name, last_name, email, phone, mobile,
            position, company_id, notes, status, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
        "#,
    )
    .bind::<DieselUuid, _>(id)
    .bind::<Nullable<DieselUuid>, _>(new_contact.owner_id)
    .bind::<Text, _>(&new_contact.first_name)
    .bind::<Nullable<Text>, _>(new_contact.last_name.as_deref())
    .bind::<Nullable<Text>, _>(new_contact.email.as_deref())
    .bind::<Nullable<Text>, _>(new_contact.phone.as_deref())
    .bind::<Nullable<Text>, _>(new_contact.mobile.as_deref())
    .bind::<Nullable<Text>, _>(new_contact.position.as_deref())
    .bind::<Nullable<DieselUuid>, _>(new_contact.company_id)
    .bind::<Nullable<Text>, _>(new_contact.notes.as_deref())
    .bind::<Text, _>(&new_contact.status)
    .execute(conn)?;
    Ok(id)
}

/// Case-insensitive exact name match. Never creates a company.
pub fn find_company_by_name(
    conn: &mut PgConnection,
    name: &str,
) -> Result<Option<Company>, diesel::result::Error> {
    let rows: Vec<CompanyRow> =
        diesel::sql_query("SELECT id, name FROM companies WHERE name ILIKE $1 LIMIT 1")
            .bind::<Text, _>(name)
            .load(conn)?;
    Ok(rows
        .into_iter()
        .next()
        .map(|r| Company { id: r.id, name: r.name }))
}

pub fn insert_activity(
    conn: &mut PgConnection,
    new_activity: &NewActivity,
) -> Result<Uuid, diesel::result::Error> {
    let id = Uuid::new_v4();
    diesel::sql_query(
        r#"
        INSERT INTO activities (id, activity_type, subject, description, contact_id, user_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW())
        "#,
    )
    .bind::<DieselUuid, _>(id)
    .bind::<Text, _>(&new_activity.activity_type)
    .bind::<Text, _>(&new_activity.subject)
    .bind::<Nullable<Text>, _>(new_activity.description.as_deref())
    .bind::<Nullable<DieselUuid>, _>(new_activity.contact_id)
    .bind::<Nullable<DieselUuid>, _>(new_activity.user_id)
    .execute(conn)?;
    Ok(id)
}

fn row_to_contact(row: ContactRow) -> Contact {
    Contact {
        id: row.id,
        owner_id: row.owner_id,
        first_name: row.first_name,
        last_name: row.last_name,
        email: row.email,
        phone: row.phone,
        mobile: row.mobile,
        position: row.position,
        company_id: row.company_id,
        notes: row.notes,
        status: row.status,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}
