use axum::Router;
use diesel::connection::SimpleConnection;
use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crmserver::campaigns;
use crmserver::config::AppConfig;
use crmserver::directory;
use crmserver::outbound::SmtpMailer;
use crmserver::prospects;
use crmserver::shared::state::AppState;
use crmserver::shared::utils::create_conn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::load()?;
    let conn = create_conn(&config.database)?;

    run_migrations(&conn)?;

    let transport = Arc::new(SmtpMailer::new(config.email.clone()));
    let state = Arc::new(AppState {
        conn,
        config: config.clone(),
        transport,
    });

    let app = Router::new()
        .nest("/api/campaigns", campaigns::campaigns_routes(state.clone()))
        .nest(
            "/api/engagements",
            campaigns::engagements_routes(state.clone()),
        )
        .nest("/api/prospects", prospects::prospects_routes(state.clone()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Starting CRM server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn run_migrations(pool: &crmserver::shared::utils::DbPool) -> anyhow::Result<()> {
    let mut conn = pool.get()?;

    // Ordered by foreign key dependencies; the engagement table references
    // both contacts and prospects.
    let migrations = [
        directory::create_directory_tables_migration(),
        campaigns::create_campaign_tables_migration(),
        prospects::create_prospect_tables_migration(),
        campaigns::create_engagement_tables_migration(),
    ];

    for migration in migrations {
        if let Err(e) = conn.batch_execute(migration) {
            error!("Migration failed: {e}");
            return Err(e.into());
        }
    }
    info!("Database migrations applied");
    Ok(())
}
