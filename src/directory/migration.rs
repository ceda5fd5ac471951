pub fn create_directory_tables_migration() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS companies (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE INDEX IF NOT EXISTS idx_companies_name ON companies(LOWER(name));

    CREATE TABLE IF NOT EXISTS contacts (
        id UUID PRIMARY KEY,
        owner_id UUID,
        first_name TEXT NOT NULL,
        last_name TEXT,
        email TEXT UNIQUE,
        phone TEXT,
        mobile TEXT,
        position TEXT,
        company_id UUID REFERENCES companies(id) ON DELETE SET NULL,
        notes TEXT,
        status TEXT NOT NULL DEFAULT 'active',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE INDEX IF NOT EXISTS idx_contacts_email ON contacts(email);
    CREATE INDEX IF NOT EXISTS idx_contacts_status ON contacts(status);

    CREATE TABLE IF NOT EXISTS activities (
        id UUID PRIMARY KEY,
        activity_type TEXT NOT NULL,
        subject TEXT NOT NULL,
        description TEXT,
        contact_id UUID REFERENCES contacts(id) ON DELETE CASCADE,
        user_id UUID,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE INDEX IF NOT EXISTS idx_activities_contact ON activities(contact_id);
    "#
}
