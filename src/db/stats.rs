use super::DBClient;
use crate::dtos::{
    AdminDashboardDto, CountByKeyDto, DashboardOverviewDto, PriceBucketDto, PriceRangeDto,
    ReportsDto, StatsOverviewDto,
};
use crate::models::{LeadStatus, ListingType, PropertyStatus, UserType};
use sqlx::{Postgres, QueryBuilder, Row};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Lower bounds of the price histogram buckets. The last bucket is open.
pub fn price_bucket_bounds(listing_type: ListingType) -> &'static [i64] {
    match listing_type {
        ListingType::Sale => &[0, 50_000, 100_000, 200_000, 500_000, 1_000_000],
        ListingType::Rent => &[0, 250, 500, 1_000, 2_000, 5_000],
    }
}

pub(crate) fn buckets_from_counts(bounds: &[i64], counts: &[i64]) -> Vec<PriceBucketDto> {
    bounds
        .iter()
        .enumerate()
        .map(|(i, min)| PriceBucketDto {
            min: *min,
            max: bounds.get(i + 1).copied(),
            count: counts.get(i).copied().unwrap_or(0),
        })
        .collect()
}

/// Zero-fills every known key so clients always see the full set.
pub(crate) fn counts_map<'a>(
    keys: impl IntoIterator<Item = &'a str>,
    rows: Vec<CountByKeyDto>,
) -> BTreeMap<String, i64> {
    let mut map: BTreeMap<String, i64> = keys.into_iter().map(|k| (k.to_string(), 0)).collect();
    for row in rows {
        map.insert(row.key, row.count);
    }
    map
}

async fn count_by(
    pool: &sqlx::PgPool,
    table: &str,
    column: &str,
    user_id: Option<Uuid>,
) -> Result<Vec<CountByKeyDto>, sqlx::Error> {
    let filter = if user_id.is_some() {
        "WHERE user_id = $1"
    } else {
        "WHERE $1::uuid IS NULL"
    };
    sqlx::query_as::<_, CountByKeyDto>(&format!(
        "SELECT {column}::text AS key, COUNT(*) AS count FROM {table} {filter} GROUP BY {column}"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub trait StatsExt {
    async fn stats_overview(&self) -> Result<StatsOverviewDto, sqlx::Error>;

    async fn price_ranges(&self) -> Result<Vec<PriceRangeDto>, sqlx::Error>;

    /// Owner dashboard numbers
    async fn dashboard_overview(&self, user_id: Uuid) -> Result<DashboardOverviewDto, sqlx::Error>;

    async fn admin_dashboard(&self) -> Result<AdminDashboardDto, sqlx::Error>;

    async fn reports(&self) -> Result<ReportsDto, sqlx::Error>;
}

impl StatsExt for DBClient {
    async fn stats_overview(&self) -> Result<StatsOverviewDto, sqlx::Error> {
        sqlx::query_as::<_, StatsOverviewDto>(
            r#"
            SELECT
                COUNT(*) AS active_listings,
                COUNT(*) FILTER (WHERE p.listing_type = 'sale') AS for_sale,
                COUNT(*) FILTER (WHERE p.listing_type = 'rent') AS for_rent,
                COUNT(*) FILTER (WHERE p.is_featured) AS featured,
                COUNT(DISTINCT p.user_id) AS owners,
                COUNT(DISTINCT p.governorate_id) AS governorates_with_listings
            FROM properties p
            WHERE p.status = 'active' AND p.is_available = TRUE
            "#,
        )
        .fetch_one(&self.pool)
        .await
    }

    async fn price_ranges(&self) -> Result<Vec<PriceRangeDto>, sqlx::Error> {
        let mut ranges = Vec::new();

        for listing_type in [ListingType::Sale, ListingType::Rent] {
            let bounds = price_bucket_bounds(listing_type);

            let mut builder = QueryBuilder::<Postgres>::new(
                "SELECT COUNT(*) AS count, MIN(p.price) AS min_price, MAX(p.price) AS max_price, \
                 AVG(p.price)::float8 AS avg_price",
            );
            for (i, min) in bounds.iter().enumerate() {
                builder
                    .push(", COUNT(*) FILTER (WHERE p.price >= ")
                    .push_bind(*min);
                if let Some(max) = bounds.get(i + 1) {
                    builder.push(" AND p.price < ").push_bind(*max);
                }
                builder.push(")");
            }
            builder
                .push(" FROM properties p WHERE p.status = 'active' AND p.is_available = TRUE AND p.listing_type = ")
                .push_bind(listing_type);

            let row = builder.build().fetch_one(&self.pool).await?;
            let counts = (0..bounds.len())
                .map(|i| row.try_get::<i64, _>(4 + i))
                .collect::<Result<Vec<_>, _>>()?;

            ranges.push(PriceRangeDto {
                listing_type,
                count: row.try_get("count")?,
                min_price: row.try_get("min_price")?,
                max_price: row.try_get("max_price")?,
                avg_price: row.try_get("avg_price")?,
                buckets: buckets_from_counts(bounds, &counts),
            });
        }

        Ok(ranges)
    }

    async fn dashboard_overview(&self, user_id: Uuid) -> Result<DashboardOverviewDto, sqlx::Error> {
        let by_status = count_by(&self.pool, "properties", "status", Some(user_id)).await?;
        let properties_by_status = counts_map(PropertyStatus::ALL.iter().map(|s| s.to_str()), by_status);
        let total_properties = properties_by_status.values().sum::<i64>();

        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COALESCE(SUM(views_count), 0)::bigint FROM properties WHERE user_id = $1) AS total_views,
                (SELECT COUNT(*) FROM favorites f JOIN properties p ON p.id = f.property_id
                  WHERE p.user_id = $1) AS favorites_received,
                (SELECT COUNT(*) FROM leads l JOIN properties p ON p.id = l.property_id
                  WHERE p.user_id = $1) AS leads_received,
                (SELECT COUNT(*) FROM favorites WHERE user_id = $1) AS my_favorites
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(DashboardOverviewDto {
            total_properties,
            properties_by_status,
            total_views: row.try_get("total_views")?,
            favorites_received: row.try_get("favorites_received")?,
            leads_received: row.try_get("leads_received")?,
            my_favorites: row.try_get("my_favorites")?,
        })
    }

    async fn admin_dashboard(&self) -> Result<AdminDashboardDto, sqlx::Error> {
        let users = count_by(&self.pool, "users", "user_type", None).await?;
        let properties = count_by(&self.pool, "properties", "status", None).await?;
        let leads = count_by(&self.pool, "leads", "status", None).await?;

        let listings_per_month = sqlx::query_as::<_, CountByKeyDto>(
            r#"
            SELECT to_char(date_trunc('month', created_at), 'YYYY-MM') AS key, COUNT(*) AS count
            FROM properties
            WHERE created_at >= date_trunc('month', NOW()) - INTERVAL '5 months'
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(AdminDashboardDto {
            users_by_type: counts_map(
                [
                    UserType::GeneralUser,
                    UserType::PropertyOwner,
                    UserType::Admin,
                    UserType::SuperAdmin,
                ]
                .iter()
                .map(|t| t.to_str()),
                users,
            ),
            properties_by_status: counts_map(PropertyStatus::ALL.iter().map(|s| s.to_str()), properties),
            leads_by_status: counts_map(LeadStatus::ALL.iter().map(|s| s.to_str()), leads),
            listings_per_month,
        })
    }

    async fn reports(&self) -> Result<ReportsDto, sqlx::Error> {
        let listings_per_governorate = sqlx::query_as::<_, CountByKeyDto>(
            r#"
            SELECT COALESCE(g.name_en, 'Unspecified') AS key, COUNT(*) AS count
            FROM properties p
            LEFT JOIN governorates g ON g.id = p.governorate_id
            GROUP BY 1
            ORDER BY 2 DESC, 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let listings_per_type = sqlx::query_as::<_, CountByKeyDto>(
            "SELECT property_type::text AS key, COUNT(*) AS count FROM properties GROUP BY 1 ORDER BY 2 DESC, 1",
        )
        .fetch_all(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COUNT(*) FILTER (WHERE status = 'qualified') AS qualified FROM leads",
        )
        .fetch_one(&self.pool)
        .await?;
        let leads_total: i64 = row.try_get("total")?;
        let leads_qualified: i64 = row.try_get("qualified")?;

        Ok(ReportsDto {
            listings_per_governorate,
            listings_per_type,
            leads_total,
            leads_qualified,
            lead_conversion_rate: conversion_rate(leads_qualified, leads_total),
        })
    }
}

pub(crate) fn conversion_rate(qualified: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        qualified as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_pair_bounds_with_counts() {
        let bounds = price_bucket_bounds(ListingType::Rent);
        let buckets = buckets_from_counts(bounds, &[1, 2, 3]);

        assert_eq!(buckets.len(), bounds.len());
        assert_eq!(buckets[0], PriceBucketDto { min: 0, max: Some(250), count: 1 });
        assert_eq!(buckets[2].count, 3);
        assert_eq!(buckets[3].count, 0);
        let last = buckets.last().unwrap();
        assert_eq!(last.min, 5_000);
        assert_eq!(last.max, None);
    }

    #[test]
    fn counts_map_zero_fills() {
        let map = counts_map(
            LeadStatus::ALL.iter().map(|s| s.to_str()),
            vec![CountByKeyDto {
                key: "qualified".into(),
                count: 4,
            }],
        );
        assert_eq!(map.len(), 5);
        assert_eq!(map["qualified"], 4);
        assert_eq!(map["new"], 0);
    }

    #[test]
    fn conversion_rate_handles_no_leads() {
        assert_eq!(conversion_rate(0, 0), 0.0);
        assert_eq!(conversion_rate(1, 4), 0.25);
    }
}
