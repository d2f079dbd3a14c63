use sqlx::{Pool, Postgres};

pub mod scheduler;

mod user;
pub use user::{NewUser, UserExt};

mod token;
pub use token::TokenExt;

mod property;
pub use property::PropertyExt;

mod media;
pub use media::{MediaExt, NewMedia};

mod favorite;
pub use favorite::FavoriteExt;

mod lead;
pub use lead::LeadExt;

mod taxonomy;
pub use taxonomy::TaxonomyExt;

mod location;
pub use location::LocationExt;

mod stats;
pub use stats::StatsExt;

#[derive(Debug, Clone)]
pub struct DBClient {
    pool: Pool<Postgres>,
}
impl DBClient {
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

/// page 1 = offset 0. Saturates instead of overflowing on absurd pages.
pub(crate) fn offset(page: i64, per_page: i64) -> i64 {
    (page.max(1) - 1).saturating_mul(per_page.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtos::PageQueryDto;
    use validator::Validate;

    #[test]
    fn offset_starts_at_zero() {
        assert_eq!(offset(1, 12), 0);
        assert_eq!(offset(0, 12), 0);
        assert_eq!(offset(3, 12), 24);
    }

    #[test]
    fn huge_page_never_goes_negative() {
        assert_eq!(offset(i64::MAX, 12), i64::MAX);
        assert!(offset(i64::MAX, 50) >= 0);
    }

    #[test]
    fn huge_page_fails_validation() {
        let query = PageQueryDto {
            page: Some(i64::MAX),
            per_page: Some(12),
        };
        assert!(query.validate().is_err());
    }
}
