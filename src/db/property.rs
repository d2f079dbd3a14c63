use super::{DBClient, offset};
use crate::dtos::{
    AdminPropertiesQuery, BulkAction, CreatePropertyDto, PropertyCardDto, PropertyFilters,
    PropertySort, PropertyTermsDto, UpdatePropertyDto,
};
use crate::models::{Property, PropertyStatus, TaxonomyKind};
use sqlx::{Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::TaxonomyExt;

/// Card columns plus the main image path (medium conversion when present).
pub(crate) const CARD_SELECT: &str = r#"
SELECT p.id, p.title, p.slug, p.description, p.property_type, p.listing_type, p.price,
       p.currency, p.area, p.bedrooms, p.bathrooms, p.governorate_id, p.city_id,
       p.neighborhood_id, p.status, p.is_available, p.is_featured, p.views_count, p.created_at,
       (SELECT COALESCE(m.conversions->>'medium', m.path)
          FROM media m
         WHERE m.model_type = 'property'
           AND m.model_id = p.id::text
           AND m.collection_name = 'main_image'
         ORDER BY m.order_column
         LIMIT 1) AS main_image
FROM properties p"#;

/// The public listing predicate. Every anonymous read goes through it.
pub(crate) const PUBLICLY_VISIBLE: &str = "p.status = 'active' AND p.is_available = TRUE";

/// `%q%` with the LIKE metacharacters in `q` matched literally.
pub(crate) fn contains_pattern(q: &str) -> String {
    let mut pattern = String::with_capacity(q.len() + 2);
    pattern.push('%');
    for c in q.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Appends the WHERE clause of a public search.
pub(crate) fn push_search_filters<'q>(
    builder: &mut QueryBuilder<'q, Postgres>,
    filters: &'q PropertyFilters,
) {
    builder.push(" WHERE ").push(PUBLICLY_VISIBLE);

    if let Some(q) = filters.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = contains_pattern(q);
        builder
            .push(" AND (p.title ILIKE ")
            .push_bind(pattern.clone())
            .push(r" ESCAPE '\' OR p.description ILIKE ")
            .push_bind(pattern.clone())
            .push(r" ESCAPE '\' OR p.address ILIKE ")
            .push_bind(pattern)
            .push(r" ESCAPE '\')");
    }
    if let Some(property_type) = filters.property_type {
        builder.push(" AND p.property_type = ").push_bind(property_type);
    }
    if let Some(listing_type) = filters.listing_type {
        builder.push(" AND p.listing_type = ").push_bind(listing_type);
    }
    if let Some(min) = filters.min_price {
        builder.push(" AND p.price >= ").push_bind(min);
    }
    if let Some(max) = filters.max_price {
        builder.push(" AND p.price <= ").push_bind(max);
    }
    if let Some(id) = filters.governorate_id {
        builder.push(" AND p.governorate_id = ").push_bind(id);
    }
    if let Some(id) = filters.city_id {
        builder.push(" AND p.city_id = ").push_bind(id);
    }
    if let Some(id) = filters.neighborhood_id {
        builder.push(" AND p.neighborhood_id = ").push_bind(id);
    }
    if let Some(n) = filters.bedrooms {
        builder.push(" AND p.bedrooms >= ").push_bind(n);
    }
    if let Some(n) = filters.bathrooms {
        builder.push(" AND p.bathrooms >= ").push_bind(n);
    }
    if let Some(min) = filters.min_area {
        builder.push(" AND p.area >= ").push_bind(min);
    }
    if let Some(max) = filters.max_area {
        builder.push(" AND p.area <= ").push_bind(max);
    }
    if let Some(featured) = filters.featured {
        builder.push(" AND p.is_featured = ").push_bind(featured);
    }

    // Every requested amenity must be attached
    let amenities = filters.amenity_ids();
    if !amenities.is_empty() {
        let wanted = amenities.len() as i64;
        builder
            .push(" AND p.id IN (SELECT property_id FROM property_amenities WHERE term_id = ANY(")
            .push_bind(amenities)
            .push(") GROUP BY property_id HAVING COUNT(DISTINCT term_id) = ")
            .push_bind(wanted)
            .push(")");
    }
}

pub(crate) fn order_clause(sort: PropertySort) -> &'static str {
    match sort {
        PropertySort::Newest => " ORDER BY p.created_at DESC, p.id DESC",
        PropertySort::Oldest => " ORDER BY p.created_at ASC, p.id ASC",
        PropertySort::PriceAsc => " ORDER BY p.price ASC, p.id DESC",
        PropertySort::PriceDesc => " ORDER BY p.price DESC, p.id DESC",
        PropertySort::Popular => " ORDER BY p.views_count DESC, p.id DESC",
    }
}

async fn attach_terms(
    tx: &mut Transaction<'_, Postgres>,
    property_id: i64,
    kind: TaxonomyKind,
    ids: &[i32],
) -> Result<(), sqlx::Error> {
    let Some(pivot) = kind.pivot() else {
        return Ok(());
    };

    sqlx::query(&format!("DELETE FROM {} WHERE property_id = $1", pivot))
        .bind(property_id)
        .execute(&mut **tx)
        .await?;

    if ids.is_empty() {
        return Ok(());
    }

    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();

    sqlx::query(&format!(
        "INSERT INTO {} (property_id, term_id) SELECT $1, UNNEST($2::int[])",
        pivot
    ))
    .bind(property_id)
    .bind(ids)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub trait PropertyExt {
    /// Public search: one page of cards plus the total match count
    async fn search_properties(
        &self,
        filters: &PropertyFilters,
    ) -> Result<(Vec<PropertyCardDto>, i64), sqlx::Error>;

    async fn get_property(&self, id: i64) -> Result<Option<Property>, sqlx::Error>;

    async fn get_property_by_slug(&self, slug: &str) -> Result<Option<Property>, sqlx::Error>;

    async fn get_properties_by_ids(&self, ids: &[i64]) -> Result<Vec<Property>, sqlx::Error>;

    /// Slugs equal to `base` or of the form `base-N`, excluding `except_id`
    async fn slugs_like(
        &self,
        base: &str,
        except_id: Option<i64>,
    ) -> Result<Vec<String>, sqlx::Error>;

    /// Insert the listing and its taxonomy links in one transaction
    async fn create_property(
        &self,
        user_id: Uuid,
        dto: &CreatePropertyDto,
        slug: &str,
        description: &str,
        status: PropertyStatus,
    ) -> Result<Property, sqlx::Error>;

    /// Apply the fields present in `dto`; `slug`/`description` are the
    /// already derived values when the title/description changed
    async fn update_property(
        &self,
        id: i64,
        dto: &UpdatePropertyDto,
        slug: Option<&str>,
        description: Option<&str>,
    ) -> Result<Property, sqlx::Error>;

    async fn delete_property(&self, id: i64) -> Result<bool, sqlx::Error>;

    async fn increment_views(&self, id: i64) -> Result<(), sqlx::Error>;

    async fn property_terms(&self, property: &Property) -> Result<PropertyTermsDto, sqlx::Error>;

    /// Owner dashboard: own listings in any status
    async fn list_user_properties(
        &self,
        user_id: Uuid,
        status: Option<PropertyStatus>,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<PropertyCardDto>, i64), sqlx::Error>;

    /// Admin moderation list, any status
    async fn admin_list_properties(
        &self,
        query: &AdminPropertiesQuery,
    ) -> Result<(Vec<PropertyCardDto>, i64), sqlx::Error>;

    async fn set_property_status(
        &self,
        id: i64,
        status: PropertyStatus,
    ) -> Result<Option<Property>, sqlx::Error>;

    async fn toggle_featured(&self, id: i64) -> Result<Option<Property>, sqlx::Error>;

    /// Non-destructive bulk actions. Returns the slugs touched.
    async fn bulk_update_properties(
        &self,
        ids: &[i64],
        action: BulkAction,
    ) -> Result<Vec<String>, sqlx::Error>;
}

impl PropertyExt for DBClient {
    async fn search_properties(
        &self,
        filters: &PropertyFilters,
    ) -> Result<(Vec<PropertyCardDto>, i64), sqlx::Error> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM properties p");
        push_search_filters(&mut count, filters);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let per_page = filters.per_page();
        let mut list = QueryBuilder::<Postgres>::new(CARD_SELECT);
        push_search_filters(&mut list, filters);
        list.push(order_clause(filters.sort.unwrap_or_default()))
            .push(" LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind(offset(filters.page(), per_page));

        let cards = list
            .build_query_as::<PropertyCardDto>()
            .fetch_all(&self.pool)
            .await?;

        Ok((cards, total))
    }

    async fn get_property(&self, id: i64) -> Result<Option<Property>, sqlx::Error> {
        sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_property_by_slug(&self, slug: &str) -> Result<Option<Property>, sqlx::Error> {
        sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_properties_by_ids(&self, ids: &[i64]) -> Result<Vec<Property>, sqlx::Error> {
        sqlx::query_as::<_, Property>("SELECT * FROM properties WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
    }

    async fn slugs_like(
        &self,
        base: &str,
        except_id: Option<i64>,
    ) -> Result<Vec<String>, sqlx::Error> {
        // LIKE wildcards cannot appear in a slug, so the base is safe to embed
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT slug FROM properties
            WHERE (slug = $1 OR slug LIKE $1 || '-%')
              AND ($2::bigint IS NULL OR id <> $2)
            "#,
        )
        .bind(base)
        .bind(except_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn create_property(
        &self,
        user_id: Uuid,
        dto: &CreatePropertyDto,
        slug: &str,
        description: &str,
        status: PropertyStatus,
    ) -> Result<Property, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let property = sqlx::query_as::<_, Property>(
            r#"
            INSERT INTO properties (
                user_id, title, slug, description, property_type, listing_type, price,
                price_type_id, currency, area, bedrooms, bathrooms, address,
                governorate_id, city_id, neighborhood_id, latitude, longitude,
                status, is_available, published_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, 'USD'), $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, COALESCE($20, TRUE),
                    CASE WHEN $19 = 'active'::property_status THEN NOW() END)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(dto.title.trim())
        .bind(slug)
        .bind(description)
        .bind(dto.property_type)
        .bind(dto.listing_type)
        .bind(dto.price)
        .bind(dto.price_type_id)
        .bind(dto.currency.as_deref().map(str::to_uppercase))
        .bind(dto.area)
        .bind(dto.bedrooms)
        .bind(dto.bathrooms)
        .bind(dto.address.as_deref())
        .bind(dto.governorate_id)
        .bind(dto.city_id)
        .bind(dto.neighborhood_id)
        .bind(dto.latitude)
        .bind(dto.longitude)
        .bind(status)
        .bind(dto.is_available)
        .fetch_one(&mut *tx)
        .await?;

        attach_terms(&mut tx, property.id, TaxonomyKind::Amenity, &dto.amenity_ids).await?;
        attach_terms(&mut tx, property.id, TaxonomyKind::Feature, &dto.feature_ids).await?;
        attach_terms(&mut tx, property.id, TaxonomyKind::Utility, &dto.utility_ids).await?;
        attach_terms(
            &mut tx,
            property.id,
            TaxonomyKind::DocumentType,
            &dto.document_type_ids,
        )
        .await?;

        tx.commit().await?;
        Ok(property)
    }

    async fn update_property(
        &self,
        id: i64,
        dto: &UpdatePropertyDto,
        slug: Option<&str>,
        description: Option<&str>,
    ) -> Result<Property, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let mut builder = QueryBuilder::<Postgres>::new("UPDATE properties SET updated_at = NOW()");
        if let Some(title) = dto.title.as_deref() {
            builder.push(", title = ").push_bind(title.trim());
        }
        if let Some(slug) = slug {
            builder.push(", slug = ").push_bind(slug);
        }
        if let Some(description) = description {
            builder.push(", description = ").push_bind(description);
        }
        if let Some(v) = dto.property_type {
            builder.push(", property_type = ").push_bind(v);
        }
        if let Some(v) = dto.listing_type {
            builder.push(", listing_type = ").push_bind(v);
        }
        if let Some(v) = dto.price {
            builder.push(", price = ").push_bind(v);
        }
        if let Some(v) = dto.price_type_id {
            builder.push(", price_type_id = ").push_bind(v);
        }
        if let Some(v) = dto.currency.as_deref() {
            builder.push(", currency = ").push_bind(v.to_uppercase());
        }
        if let Some(v) = dto.area {
            builder.push(", area = ").push_bind(v);
        }
        if let Some(v) = dto.bedrooms {
            builder.push(", bedrooms = ").push_bind(v);
        }
        if let Some(v) = dto.bathrooms {
            builder.push(", bathrooms = ").push_bind(v);
        }
        if let Some(v) = dto.address.as_deref() {
            builder.push(", address = ").push_bind(v);
        }
        if let Some(v) = dto.governorate_id {
            builder.push(", governorate_id = ").push_bind(v);
        }
        if let Some(v) = dto.city_id {
            builder.push(", city_id = ").push_bind(v);
        }
        if let Some(v) = dto.neighborhood_id {
            builder.push(", neighborhood_id = ").push_bind(v);
        }
        if let Some(v) = dto.latitude {
            builder.push(", latitude = ").push_bind(v);
        }
        if let Some(v) = dto.longitude {
            builder.push(", longitude = ").push_bind(v);
        }
        if let Some(v) = dto.status {
            builder.push(", status = ").push_bind(v);
            if v == PropertyStatus::Active {
                builder.push(", published_at = COALESCE(published_at, NOW())");
            }
        }
        if let Some(v) = dto.is_available {
            builder.push(", is_available = ").push_bind(v);
        }
        builder.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

        let property = builder
            .build_query_as::<Property>()
            .fetch_one(&mut *tx)
            .await?;

        let links = [
            (TaxonomyKind::Amenity, &dto.amenity_ids),
            (TaxonomyKind::Feature, &dto.feature_ids),
            (TaxonomyKind::Utility, &dto.utility_ids),
            (TaxonomyKind::DocumentType, &dto.document_type_ids),
        ];
        for (kind, ids) in links {
            if let Some(ids) = ids {
                attach_terms(&mut tx, id, kind, ids).await?;
            }
        }

        tx.commit().await?;
        Ok(property)
    }

    async fn delete_property(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM properties WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_views(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE properties SET views_count = views_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn property_terms(&self, property: &Property) -> Result<PropertyTermsDto, sqlx::Error> {
        let price_type = match property.price_type_id {
            Some(id) => self
                .get_term(TaxonomyKind::PriceType, id)
                .await?
                .map(|t| crate::dtos::TermDto {
                    id: t.id,
                    name_ar: t.name_ar,
                    name_en: t.name_en,
                    name_ku: t.name_ku,
                    icon: t.icon,
                }),
            None => None,
        };

        Ok(PropertyTermsDto {
            amenities: self
                .terms_for_property(TaxonomyKind::Amenity, property.id)
                .await?,
            features: self
                .terms_for_property(TaxonomyKind::Feature, property.id)
                .await?,
            utilities: self
                .terms_for_property(TaxonomyKind::Utility, property.id)
                .await?,
            documents: self
                .terms_for_property(TaxonomyKind::DocumentType, property.id)
                .await?,
            price_type,
        })
    }

    async fn list_user_properties(
        &self,
        user_id: Uuid,
        status: Option<PropertyStatus>,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<PropertyCardDto>, i64), sqlx::Error> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM properties WHERE user_id = $1 AND ($2::property_status IS NULL OR status = $2)",
        )
        .bind(user_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            "{} WHERE p.user_id = $1 AND ($2::property_status IS NULL OR p.status = $2) \
             ORDER BY p.created_at DESC, p.id DESC LIMIT $3 OFFSET $4",
            CARD_SELECT
        );
        let cards = sqlx::query_as::<_, PropertyCardDto>(&sql)
            .bind(user_id)
            .bind(status)
            .bind(per_page)
            .bind(offset(page, per_page))
            .fetch_all(&self.pool)
            .await?;

        Ok((cards, total))
    }

    async fn admin_list_properties(
        &self,
        query: &AdminPropertiesQuery,
    ) -> Result<(Vec<PropertyCardDto>, i64), sqlx::Error> {
        fn push_filters<'q>(
            builder: &mut QueryBuilder<'q, Postgres>,
            query: &'q AdminPropertiesQuery,
        ) {
            builder.push(" WHERE TRUE");
            if let Some(status) = query.status {
                builder.push(" AND p.status = ").push_bind(status);
            }
            if let Some(user_id) = query.user_id {
                builder.push(" AND p.user_id = ").push_bind(user_id);
            }
            if let Some(featured) = query.featured {
                builder.push(" AND p.is_featured = ").push_bind(featured);
            }
            if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
                let pattern = contains_pattern(q);
                builder
                    .push(" AND (p.title ILIKE ")
                    .push_bind(pattern.clone())
                    .push(r" ESCAPE '\' OR p.slug ILIKE ")
                    .push_bind(pattern)
                    .push(r" ESCAPE '\')");
            }
        }

        let page = query.page.unwrap_or(1);
        let per_page = query.per_page.unwrap_or(20);

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM properties p");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut list = QueryBuilder::<Postgres>::new(CARD_SELECT);
        push_filters(&mut list, query);
        list.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind(offset(page, per_page));
        let cards = list
            .build_query_as::<PropertyCardDto>()
            .fetch_all(&self.pool)
            .await?;

        Ok((cards, total))
    }

    async fn set_property_status(
        &self,
        id: i64,
        status: PropertyStatus,
    ) -> Result<Option<Property>, sqlx::Error> {
        sqlx::query_as::<_, Property>(
            r#"
            UPDATE properties
            SET status = $1,
                published_at = CASE WHEN $1 = 'active'::property_status
                                    THEN COALESCE(published_at, NOW())
                                    ELSE published_at END,
                updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn toggle_featured(&self, id: i64) -> Result<Option<Property>, sqlx::Error> {
        sqlx::query_as::<_, Property>(
            "UPDATE properties SET is_featured = NOT is_featured, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn bulk_update_properties(
        &self,
        ids: &[i64],
        action: BulkAction,
    ) -> Result<Vec<String>, sqlx::Error> {
        let set = match action {
            BulkAction::Activate => {
                "status = 'active', published_at = COALESCE(published_at, NOW())"
            }
            BulkAction::Deactivate => "status = 'inactive'",
            BulkAction::Feature => "is_featured = TRUE",
            BulkAction::Unfeature => "is_featured = FALSE",
            // Deletion goes through delete_property so media is cleaned up
            BulkAction::Delete => return Ok(Vec::new()),
        };

        sqlx::query_scalar::<_, String>(&format!(
            "UPDATE properties SET {}, updated_at = NOW() WHERE id = ANY($1) RETURNING slug",
            set
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingType, PropertyType};

    fn where_clause(filters: &PropertyFilters) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM properties p");
        push_search_filters(&mut builder, filters);
        builder.sql().to_string()
    }

    #[test]
    fn search_always_requires_public_visibility() {
        let empty = where_clause(&PropertyFilters::default());
        assert!(empty.ends_with("WHERE p.status = 'active' AND p.is_available = TRUE"));

        let busy = where_clause(&PropertyFilters {
            q: Some("villa".into()),
            property_type: Some(PropertyType::Villa),
            listing_type: Some(ListingType::Sale),
            min_price: Some(10),
            featured: Some(true),
            ..Default::default()
        });
        assert!(busy.contains(PUBLICLY_VISIBLE));
        assert!(busy.contains("p.property_type = $4"));
        assert!(busy.contains("p.is_featured = $7"));
    }

    #[test]
    fn text_query_matches_wildcards_literally() {
        assert_eq!(contains_pattern("villa"), "%villa%");
        assert_eq!(contains_pattern("100%"), "%100\\%%");
        assert_eq!(contains_pattern("sea_view"), "%sea\\_view%");
        assert_eq!(contains_pattern(r"a\b"), r"%a\\b%");

        let sql = where_clause(&PropertyFilters {
            q: Some("%".into()),
            ..Default::default()
        });
        assert_eq!(sql.matches(r"ESCAPE '\'").count(), 3);
    }

    #[test]
    fn amenities_must_all_match() {
        let sql = where_clause(&PropertyFilters {
            amenities: Some("4,2,4".into()),
            ..Default::default()
        });
        assert!(sql.contains("term_id = ANY($1)"));
        assert!(sql.contains("HAVING COUNT(DISTINCT term_id) = $2"));
    }

    #[test]
    fn blank_query_adds_no_text_filter() {
        let sql = where_clause(&PropertyFilters {
            q: Some("   ".into()),
            ..Default::default()
        });
        assert!(!sql.contains("ILIKE"));
    }

    #[test]
    fn sort_orders_are_stable() {
        for sort in [
            PropertySort::Newest,
            PropertySort::Oldest,
            PropertySort::PriceAsc,
            PropertySort::PriceDesc,
            PropertySort::Popular,
        ] {
            assert!(order_clause(sort).contains("p.id"));
        }
        assert!(order_clause(PropertySort::PriceAsc).contains("p.price ASC"));
    }
}
