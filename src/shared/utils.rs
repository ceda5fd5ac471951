use crate::config::DatabaseConfig;
use anyhow::Context;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub fn create_conn(config: &DatabaseConfig) -> anyhow::Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(&config.url);
    Pool::builder()
        .max_size(config.max_connections)
        .build(manager)
        .context("Failed to build database connection pool")
}

/// OFFSET for a 1-based page. Widened to i64 so an absurd page number from
/// the query string cannot overflow.
pub fn page_offset(page: i32, per_page: i32) -> i64 {
    i64::from(page.max(1) - 1) * i64::from(per_page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_offset_is_zero_based_and_wide() {
        assert_eq!(page_offset(1, 25), 0);
        assert_eq!(page_offset(3, 25), 50);
        assert_eq!(page_offset(i32::MAX, i32::MAX), i64::from(i32::MAX - 1) * i64::from(i32::MAX));
    }
}
