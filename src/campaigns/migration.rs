pub fn create_campaign_tables_migration() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS email_templates (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        subject TEXT NOT NULL,
        body TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE TABLE IF NOT EXISTS campaigns (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        campaign_type TEXT NOT NULL DEFAULT 'email',
        status TEXT NOT NULL DEFAULT 'draft',
        start_date TIMESTAMPTZ,
        end_date TIMESTAMPTZ,
        actual_start_date TIMESTAMPTZ,
        actual_end_date TIMESTAMPTZ,
        budget NUMERIC(15,2) NOT NULL DEFAULT 0,
        actual_cost NUMERIC(15,2) NOT NULL DEFAULT 0,
        expected_revenue NUMERIC(15,2),
        actual_revenue NUMERIC(15,2) NOT NULL DEFAULT 0,
        target_audience_size INTEGER NOT NULL DEFAULT 0,
        target_response_rate NUMERIC(5,2),
        target_conversion_rate NUMERIC(5,2),
        sent_count INTEGER NOT NULL DEFAULT 0,
        delivered_count INTEGER NOT NULL DEFAULT 0,
        opened_count INTEGER NOT NULL DEFAULT 0,
        clicked_count INTEGER NOT NULL DEFAULT 0,
        responded_count INTEGER NOT NULL DEFAULT 0,
        bounced_count INTEGER NOT NULL DEFAULT 0,
        unsubscribed_count INTEGER NOT NULL DEFAULT 0,
        converted_count INTEGER NOT NULL DEFAULT 0,
        prospects_generated INTEGER NOT NULL DEFAULT 0,
        email_template_id UUID REFERENCES email_templates(id),
        email_subject TEXT,
        email_from_name TEXT,
        email_from_email TEXT,
        tags JSONB NOT NULL DEFAULT '[]',
        category TEXT,
        owner_id UUID NOT NULL,
        created_by UUID,
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        last_executed_at TIMESTAMPTZ
    );

    CREATE INDEX IF NOT EXISTS idx_campaigns_status ON campaigns(status);
    CREATE INDEX IF NOT EXISTS idx_campaigns_type ON campaigns(campaign_type);
    CREATE INDEX IF NOT EXISTS idx_campaigns_owner ON campaigns(owner_id);

    CREATE TABLE IF NOT EXISTS campaign_metrics (
        id UUID PRIMARY KEY,
        campaign_id UUID NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
        metric_date TIMESTAMPTZ NOT NULL,
        emails_sent INTEGER NOT NULL DEFAULT 0,
        emails_delivered INTEGER NOT NULL DEFAULT 0,
        emails_opened INTEGER NOT NULL DEFAULT 0,
        emails_clicked INTEGER NOT NULL DEFAULT 0,
        conversions INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );

    CREATE INDEX IF NOT EXISTS idx_campaign_metrics_campaign
        ON campaign_metrics(campaign_id, metric_date);
    "#
}

// Runs after the contacts and prospects tables exist; the engagement table
// references both.
pub fn create_engagement_tables_migration() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS engagement_records (
        id UUID PRIMARY KEY,
        campaign_id UUID NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
        contact_id UUID REFERENCES contacts(id) ON DELETE CASCADE,
        prospect_id UUID REFERENCES prospects(id) ON DELETE CASCADE,
        status TEXT NOT NULL DEFAULT 'pending',
        sent_at TIMESTAMPTZ,
        delivered_at TIMESTAMPTZ,
        opened_at TIMESTAMPTZ,
        clicked_at TIMESTAMPTZ,
        responded_at TIMESTAMPTZ,
        converted_at TIMESTAMPTZ,
        bounced_at TIMESTAMPTZ,
        unsubscribed_at TIMESTAMPTZ,
        open_count INTEGER NOT NULL DEFAULT 0,
        click_count INTEGER NOT NULL DEFAULT 0,
        email_sent_to TEXT,
        email_message_id TEXT,
        email_subject TEXT,
        deal_id UUID,
        conversion_value NUMERIC(15,2),
        error_message TEXT,
        bounce_type TEXT,
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CHECK ((contact_id IS NULL) <> (prospect_id IS NULL))
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_engagement_campaign_contact
        ON engagement_records(campaign_id, contact_id) WHERE contact_id IS NOT NULL;
    CREATE UNIQUE INDEX IF NOT EXISTS idx_engagement_campaign_prospect
        ON engagement_records(campaign_id, prospect_id) WHERE prospect_id IS NOT NULL;
    CREATE INDEX IF NOT EXISTS idx_engagement_status ON engagement_records(status);
    CREATE INDEX IF NOT EXISTS idx_engagement_message ON engagement_records(email_message_id);
    "#
}
