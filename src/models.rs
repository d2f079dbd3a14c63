use chrono::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account kind, stored as the Postgres ENUM `user_type`.
///
/// `Admin` and `SuperAdmin` are the staff roles allowed into the admin API.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "user_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    GeneralUser,
    PropertyOwner,
    Admin,
    SuperAdmin,
}

impl UserType {
    pub fn to_str(&self) -> &str {
        match self {
            UserType::GeneralUser => "general_user",
            UserType::PropertyOwner => "property_owner",
            UserType::Admin => "admin",
            UserType::SuperAdmin => "super_admin",
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, UserType::Admin | UserType::SuperAdmin)
    }

    pub const STAFF: [UserType; 2] = [UserType::Admin, UserType::SuperAdmin];
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    pub user_type: UserType,
    pub is_verified: bool,
    pub is_active: bool,
    pub verification_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Listing creation is reserved for verified, active owners. Staff may
    /// always list on behalf of someone.
    pub fn can_create_listings(&self) -> bool {
        if self.user_type.is_staff() {
            return self.is_active;
        }
        self.user_type == UserType::PropertyOwner && self.is_verified && self.is_active
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "property_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Apartment,
    House,
    Villa,
    Land,
    Office,
    Shop,
    Building,
    Farm,
    Warehouse,
}

impl PropertyType {
    pub fn to_str(&self) -> &str {
        match self {
            PropertyType::Apartment => "apartment",
            PropertyType::House => "house",
            PropertyType::Villa => "villa",
            PropertyType::Land => "land",
            PropertyType::Office => "office",
            PropertyType::Shop => "shop",
            PropertyType::Building => "building",
            PropertyType::Farm => "farm",
            PropertyType::Warehouse => "warehouse",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "listing_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    Rent,
    Sale,
}

impl ListingType {
    pub fn to_str(&self) -> &str {
        match self {
            ListingType::Rent => "rent",
            ListingType::Sale => "sale",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "property_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PropertyStatus {
    Draft,
    Active,
    Pending,
    Sold,
    Rented,
    Inactive,
}

impl PropertyStatus {
    pub fn to_str(&self) -> &str {
        match self {
            PropertyStatus::Draft => "draft",
            PropertyStatus::Active => "active",
            PropertyStatus::Pending => "pending",
            PropertyStatus::Sold => "sold",
            PropertyStatus::Rented => "rented",
            PropertyStatus::Inactive => "inactive",
        }
    }

    /// Statuses an owner may set on their own listing. Going live is a
    /// moderation decision.
    pub fn settable_by_owner(&self) -> bool {
        !matches!(self, PropertyStatus::Active)
    }

    pub const ALL: [PropertyStatus; 6] = [
        PropertyStatus::Draft,
        PropertyStatus::Active,
        PropertyStatus::Pending,
        PropertyStatus::Sold,
        PropertyStatus::Rented,
        PropertyStatus::Inactive,
    ];
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Property {
    pub id: i64,
    pub user_id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub property_type: PropertyType,
    pub listing_type: ListingType,
    pub price: i64,
    pub price_type_id: Option<i32>,
    pub currency: String,
    pub area: Option<f64>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub address: Option<String>,
    pub governorate_id: Option<i32>,
    pub city_id: Option<i32>,
    pub neighborhood_id: Option<i32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: PropertyStatus,
    pub is_available: bool,
    pub is_featured: bool,
    pub views_count: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Property {
    /// Listed in public search and reachable by anonymous visitors.
    pub fn is_publicly_visible(&self) -> bool {
        self.status == PropertyStatus::Active && self.is_available
    }

    pub fn is_owned_by(&self, user: &User) -> bool {
        self.user_id == user.id
    }

    /// Owners and staff see a listing whatever its status.
    pub fn is_visible_to(&self, viewer: Option<&User>) -> bool {
        if self.is_publicly_visible() {
            return true;
        }
        match viewer {
            Some(user) => self.is_owned_by(user) || user.user_type.is_staff(),
            None => false,
        }
    }
}

/// Owner model of a media row (polymorphic attachment).
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaModel {
    Property,
    User,
}

impl MediaModel {
    pub fn to_str(&self) -> &str {
        match self {
            MediaModel::Property => "property",
            MediaModel::User => "user",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Media {
    pub id: i64,
    pub uuid: Uuid,
    pub model_type: String,
    pub model_id: String,
    pub collection_name: String,
    pub file_name: String,
    pub mime_type: String,
    pub disk: String,
    pub path: String,
    pub size: i64,
    /// conversion name -> storage path
    pub conversions: sqlx::types::Json<std::collections::BTreeMap<String, String>>,
    pub order_column: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "lead_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    InProgress,
    Qualified,
    Unqualified,
    Closed,
}

impl LeadStatus {
    pub fn to_str(&self) -> &str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::InProgress => "in_progress",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Unqualified => "unqualified",
            LeadStatus::Closed => "closed",
        }
    }

    /// new -> in_progress -> qualified | unqualified -> closed
    pub fn can_transition_to(&self, next: LeadStatus) -> bool {
        use LeadStatus::*;
        matches!(
            (self, next),
            (New, InProgress)
                | (InProgress, Qualified)
                | (InProgress, Unqualified)
                | (Qualified, Closed)
                | (Unqualified, Closed)
        )
    }

    pub const ALL: [LeadStatus; 5] = [
        LeadStatus::New,
        LeadStatus::InProgress,
        LeadStatus::Qualified,
        LeadStatus::Unqualified,
        LeadStatus::Closed,
    ];
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Lead {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: String,
    pub source: Option<String>,
    pub property_id: Option<i64>,
    pub status: LeadStatus,
    pub assigned_to: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lookup row shared by amenities, features, utilities, document types and
/// price types.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct TaxonomyTerm {
    pub id: i32,
    pub name_ar: String,
    pub name_en: String,
    pub name_ku: String,
    pub icon: Option<String>,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Governorate, city or neighborhood. `parent_id` is `None` for
/// governorates.
#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct Location {
    pub id: i32,
    pub name_ar: String,
    pub name_en: String,
    pub name_ku: String,
    pub parent_id: Option<i32>,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The five lookup tables that share the `TaxonomyTerm` shape.
///
/// Deserializes from the plural path segment used by the API
/// (`/taxonomies/document-types`).
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum TaxonomyKind {
    #[serde(rename = "amenities")]
    Amenity,
    #[serde(rename = "features")]
    Feature,
    #[serde(rename = "utilities")]
    Utility,
    #[serde(rename = "document-types")]
    DocumentType,
    #[serde(rename = "price-types")]
    PriceType,
}

impl TaxonomyKind {
    pub fn table(&self) -> &'static str {
        match self {
            TaxonomyKind::Amenity => "amenities",
            TaxonomyKind::Feature => "features",
            TaxonomyKind::Utility => "utilities",
            TaxonomyKind::DocumentType => "property_document_types",
            TaxonomyKind::PriceType => "price_types",
        }
    }

    /// Where properties reference the term: (table, column).
    pub fn reference(&self) -> (&'static str, &'static str) {
        match self {
            TaxonomyKind::Amenity => ("property_amenities", "term_id"),
            TaxonomyKind::Feature => ("property_features", "term_id"),
            TaxonomyKind::Utility => ("property_utilities", "term_id"),
            TaxonomyKind::DocumentType => ("property_documents", "term_id"),
            TaxonomyKind::PriceType => ("properties", "price_type_id"),
        }
    }

    /// Pivot table for many-to-many kinds; price types are a plain FK.
    pub fn pivot(&self) -> Option<&'static str> {
        match self {
            TaxonomyKind::PriceType => None,
            _ => Some(self.reference().0),
        }
    }
}

/// Level in the governorate -> city -> neighborhood hierarchy.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LocationLevel {
    #[serde(alias = "states")]
    Governorates,
    Cities,
    Neighborhoods,
}

impl LocationLevel {
    pub fn table(&self) -> &'static str {
        match self {
            LocationLevel::Governorates => "governorates",
            LocationLevel::Cities => "cities",
            LocationLevel::Neighborhoods => "neighborhoods",
        }
    }

    pub fn parent(&self) -> Option<LocationLevel> {
        match self {
            LocationLevel::Governorates => None,
            LocationLevel::Cities => Some(LocationLevel::Governorates),
            LocationLevel::Neighborhoods => Some(LocationLevel::Cities),
        }
    }

    pub fn child(&self) -> Option<LocationLevel> {
        match self {
            LocationLevel::Governorates => Some(LocationLevel::Cities),
            LocationLevel::Cities => Some(LocationLevel::Neighborhoods),
            LocationLevel::Neighborhoods => None,
        }
    }

    /// Column on `properties` pointing at this level.
    pub fn property_column(&self) -> &'static str {
        match self {
            LocationLevel::Governorates => "governorate_id",
            LocationLevel::Cities => "city_id",
            LocationLevel::Neighborhoods => "neighborhood_id",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, sqlx::FromRow, Clone)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn user(user_type: UserType) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Test User".into(),
            email: "test@example.com".into(),
            phone: None,
            password: String::new(),
            user_type,
            is_verified: true,
            is_active: true,
            verification_token: None,
            token_expires_at: None,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn property(owner: &User, status: PropertyStatus, is_available: bool) -> Property {
        Property {
            id: 1,
            user_id: owner.id,
            title: "Sunny flat".into(),
            slug: "sunny-flat".into(),
            description: String::new(),
            property_type: PropertyType::Apartment,
            listing_type: ListingType::Rent,
            price: 500,
            price_type_id: None,
            currency: "USD".into(),
            area: None,
            bedrooms: Some(2),
            bathrooms: Some(1),
            address: None,
            governorate_id: None,
            city_id: None,
            neighborhood_id: None,
            latitude: None,
            longitude: None,
            status,
            is_available,
            is_featured: false,
            views_count: 0,
            published_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{property, user};
    use super::*;

    #[test]
    fn public_visibility_needs_active_and_available() {
        let owner = user(UserType::PropertyOwner);
        for status in PropertyStatus::ALL {
            for available in [true, false] {
                let p = property(&owner, status, available);
                let expected = status == PropertyStatus::Active && available;
                assert_eq!(p.is_publicly_visible(), expected, "{:?}/{}", status, available);
                assert_eq!(p.is_visible_to(None), expected);
            }
        }
    }

    #[test]
    fn owner_and_staff_always_see_listing() {
        let owner = user(UserType::PropertyOwner);
        let stranger = user(UserType::GeneralUser);
        let admin = user(UserType::Admin);
        let draft = property(&owner, PropertyStatus::Draft, false);

        assert!(draft.is_visible_to(Some(&owner)));
        assert!(draft.is_visible_to(Some(&admin)));
        assert!(!draft.is_visible_to(Some(&stranger)));
    }

    #[test]
    fn only_verified_active_owners_create_listings() {
        let mut owner = user(UserType::PropertyOwner);
        assert!(owner.can_create_listings());

        owner.is_verified = false;
        assert!(!owner.can_create_listings());

        owner.is_verified = true;
        owner.is_active = false;
        assert!(!owner.can_create_listings());

        assert!(!user(UserType::GeneralUser).can_create_listings());
        assert!(user(UserType::Admin).can_create_listings());
    }

    #[test]
    fn lead_pipeline_is_forward_only() {
        use LeadStatus::*;
        assert!(New.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Qualified));
        assert!(InProgress.can_transition_to(Unqualified));
        assert!(Qualified.can_transition_to(Closed));
        assert!(Unqualified.can_transition_to(Closed));

        assert!(!New.can_transition_to(Qualified));
        assert!(!New.can_transition_to(Closed));
        assert!(!Qualified.can_transition_to(Unqualified));
        assert!(!Closed.can_transition_to(New));
        for status in LeadStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn refresh_token_usability() {
        let now = Utc::now();
        let mut token = RefreshToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            expires_at: now + chrono::Duration::hours(1),
            revoked_at: None,
            created_at: now,
        };
        assert!(token.is_usable(now));
        token.revoked_at = Some(now);
        assert!(!token.is_usable(now));
        token.revoked_at = None;
        token.expires_at = now - chrono::Duration::seconds(1);
        assert!(!token.is_usable(now));
    }

    #[test]
    fn taxonomy_kinds_parse_from_path_segments() {
        let kind: TaxonomyKind = serde_json::from_str("\"document-types\"").unwrap();
        assert_eq!(kind, TaxonomyKind::DocumentType);
        assert_eq!(kind.table(), "property_document_types");
        assert_eq!(kind.pivot(), Some("property_documents"));
        assert_eq!(TaxonomyKind::PriceType.pivot(), None);
        assert_eq!(
            TaxonomyKind::PriceType.reference(),
            ("properties", "price_type_id")
        );
    }

    #[test]
    fn location_levels_link_up_and_down() {
        let level: LocationLevel = serde_json::from_str("\"states\"").unwrap();
        assert_eq!(level, LocationLevel::Governorates);
        assert_eq!(level.child(), Some(LocationLevel::Cities));
        assert_eq!(LocationLevel::Neighborhoods.parent(), Some(LocationLevel::Cities));
        assert_eq!(LocationLevel::Neighborhoods.child(), None);
    }

    #[test]
    fn owners_cannot_self_publish() {
        assert!(!PropertyStatus::Active.settable_by_owner());
        assert!(PropertyStatus::Sold.settable_by_owner());
        assert!(PropertyStatus::Draft.settable_by_owner());
    }
}
