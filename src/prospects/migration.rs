pub fn create_prospect_tables_migration() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS prospects (
        id UUID PRIMARY KEY,
        first_name TEXT NOT NULL,
        last_name TEXT,
        email TEXT UNIQUE,
        phone TEXT UNIQUE,
        company TEXT,
        job_title TEXT,
        industry TEXT,
        description TEXT,
        notes TEXT,
        source TEXT NOT NULL DEFAULT 'other',
        source_details TEXT,
        status TEXT NOT NULL DEFAULT 'new',
        lead_score INTEGER NOT NULL DEFAULT 0,
        campaign_id UUID REFERENCES campaigns(id) ON DELETE SET NULL,
        converted_to_contact_id UUID REFERENCES contacts(id) ON DELETE SET NULL,
        converted_at TIMESTAMPTZ,
        assigned_to UUID,
        created_by UUID,
        last_contacted_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE INDEX IF NOT EXISTS idx_prospects_status ON prospects(status);
    CREATE INDEX IF NOT EXISTS idx_prospects_campaign ON prospects(campaign_id);
    CREATE INDEX IF NOT EXISTS idx_prospects_lead_score ON prospects(lead_score);

    CREATE TABLE IF NOT EXISTS lead_score_history (
        id UUID PRIMARY KEY,
        prospect_id UUID NOT NULL REFERENCES prospects(id) ON DELETE CASCADE,
        old_score INTEGER NOT NULL,
        new_score INTEGER NOT NULL,
        score_change INTEGER NOT NULL,
        reason TEXT NOT NULL,
        activity_type TEXT,
        campaign_id UUID REFERENCES campaigns(id) ON DELETE SET NULL,
        changed_by UUID,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE INDEX IF NOT EXISTS idx_lead_score_history_prospect
        ON lead_score_history(prospect_id, created_at);
    "#
}
