use crate::models::{
    Lead, LeadStatus, ListingType, Location, PropertyStatus, PropertyType, TaxonomyTerm, User,
    UserType,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::{Validate, ValidationError};

// DTOs define exactly what crosses the API boundary, separate from the
// database models.

/// Display language for localized lookup names.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Ar,
    #[default]
    En,
    Ku,
}

impl Lang {
    pub fn pick<'a>(&self, ar: &'a str, en: &'a str, ku: &'a str) -> &'a str {
        let chosen = match self {
            Lang::Ar => ar,
            Lang::En => en,
            Lang::Ku => ku,
        };
        // Untranslated rows fall back to English
        if chosen.is_empty() { en } else { chosen }
    }
}

// ============================================================================
// Authentication DTOs
// ============================================================================

/// Account types open to self-registration.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistrableType {
    #[default]
    GeneralUser,
    PropertyOwner,
}

impl From<RegistrableType> for UserType {
    fn from(value: RegistrableType) -> Self {
        match value {
            RegistrableType::GeneralUser => UserType::GeneralUser,
            RegistrableType::PropertyOwner => UserType::PropertyOwner,
        }
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct RegisterUserDto {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,

    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,

    #[validate(length(min = 8, max = 64, message = "Password must be between 8 and 64 characters"))]
    pub password: String,

    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub password_confirmation: String,

    #[validate(length(min = 6, max = 32, message = "Phone number is invalid"))]
    pub phone: Option<String>,

    #[serde(default)]
    pub user_type: RegistrableType,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct LoginUserDto {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RefreshTokenDto {
    pub refresh_token: Option<String>,
}

#[derive(Serialize, Deserialize, Validate, Debug)]
pub struct VerifyEmailQueryDto {
    #[validate(length(min = 1, message = "Token is required."))]
    pub token: String,
}

#[derive(Deserialize, Serialize, Validate, Debug, Clone)]
pub struct ForgotPasswordRequestDto {
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ResetPasswordRequestDto {
    #[validate(length(min = 1, message = "Token is required."))]
    pub token: String,

    #[validate(length(min = 8, max = 64, message = "Password must be between 8 and 64 characters"))]
    pub password: String,

    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub password_confirmation: String,
}

/// Client-safe view of a user (no password or tokens).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FilterUserDto {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub user_type: String,
    pub is_verified: bool,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FilterUserDto {
    pub fn filter_user(user: &User) -> Self {
        FilterUserDto {
            id: user.id.to_string(),
            name: user.name.to_owned(),
            email: user.email.to_owned(),
            phone: user.phone.to_owned(),
            user_type: user.user_type.to_str().to_string(),
            is_verified: user.is_verified,
            is_active: user.is_active,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }

    pub fn filter_users(users: &[User]) -> Vec<FilterUserDto> {
        users.iter().map(FilterUserDto::filter_user).collect()
    }
}

/// Token pair returned by register, login and refresh.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthTokensDto {
    pub status: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: FilterUserDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserMeData {
    pub user: FilterUserDto,
    pub properties_count: i64,
    pub favorites_count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserMeResponseDto {
    pub status: String,
    pub data: UserMeData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponseDto {
    pub status: String,
    pub data: FilterUserDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponseDto {
    pub status: String,
    pub data: Vec<FilterUserDto>,
    pub pagination: PaginationDto,
}

/// Generic success response
#[derive(Serialize, Deserialize)]
pub struct Response {
    pub status: &'static str,
    pub message: String,
}

// ============================================================================
// Pagination
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaginationDto {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl PaginationDto {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };
        PaginationDto {
            page,
            per_page,
            total,
            total_pages,
        }
    }
}

#[derive(Serialize, Deserialize, Validate, Debug, Default)]
pub struct PageQueryDto {
    #[validate(range(min = 1, max = 10000))]
    pub page: Option<i64>,

    #[validate(range(min = 1, max = 50))]
    pub per_page: Option<i64>,
}

// ============================================================================
// Property DTOs
// ============================================================================

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PropertySort {
    #[default]
    Newest,
    Oldest,
    PriceAsc,
    PriceDesc,
    Popular,
}

/// Public search filters. Serialized (after normalization) into the search
/// cache key, so field order here is part of the key format.
#[derive(Debug, Deserialize, Serialize, Validate, Clone, Default, PartialEq)]
#[validate(schema(function = "validate_ranges"))]
pub struct PropertyFilters {
    #[validate(length(max = 100))]
    pub q: Option<String>,
    pub property_type: Option<PropertyType>,
    pub listing_type: Option<ListingType>,
    #[validate(range(min = 0))]
    pub min_price: Option<i64>,
    #[validate(range(min = 0))]
    pub max_price: Option<i64>,
    pub governorate_id: Option<i32>,
    pub city_id: Option<i32>,
    pub neighborhood_id: Option<i32>,
    #[validate(range(min = 0, max = 50))]
    pub bedrooms: Option<i32>,
    #[validate(range(min = 0, max = 50))]
    pub bathrooms: Option<i32>,
    #[validate(range(min = 0.0))]
    pub min_area: Option<f64>,
    #[validate(range(min = 0.0))]
    pub max_area: Option<f64>,
    pub featured: Option<bool>,
    /// Comma separated amenity ids, all of which must be present.
    #[validate(custom(function = "validate_id_list"))]
    pub amenities: Option<String>,
    pub sort: Option<PropertySort>,
    #[validate(range(min = 1, max = 10000))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 50))]
    pub per_page: Option<i64>,
}

fn validate_ranges(filters: &PropertyFilters) -> Result<(), ValidationError> {
    if let (Some(min), Some(max)) = (filters.min_price, filters.max_price) {
        if min > max {
            return Err(ValidationError::new("price_range")
                .with_message("min_price must not exceed max_price".into()));
        }
    }
    if let (Some(min), Some(max)) = (filters.min_area, filters.max_area) {
        if min > max {
            return Err(ValidationError::new("area_range")
                .with_message("min_area must not exceed max_area".into()));
        }
    }
    Ok(())
}

fn validate_id_list(list: &str) -> Result<(), ValidationError> {
    if parse_id_list(list).is_some() {
        Ok(())
    } else {
        Err(ValidationError::new("id_list").with_message("Must be a comma separated list of ids".into()))
    }
}

/// `"3, 1,3"` -> `[1, 3]`. `None` on any non-numeric entry.
pub fn parse_id_list(list: &str) -> Option<Vec<i32>> {
    let mut ids = Vec::new();
    for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        ids.push(part.parse::<i32>().ok()?);
    }
    ids.sort_unstable();
    ids.dedup();
    Some(ids)
}

pub const DEFAULT_PER_PAGE: i64 = 12;

impl PropertyFilters {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE)
    }

    pub fn amenity_ids(&self) -> Vec<i32> {
        self.amenities
            .as_deref()
            .and_then(parse_id_list)
            .unwrap_or_default()
    }

    /// Canonical form: trimmed query, defaults filled in, amenity list
    /// sorted. Equivalent searches map to the same cache entry.
    pub fn normalized(&self) -> PropertyFilters {
        let mut out = self.clone();
        out.q = self
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);
        let ids = self.amenity_ids();
        out.amenities = if ids.is_empty() {
            None
        } else {
            Some(
                ids.iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            )
        };
        out.sort = Some(self.sort.unwrap_or_default());
        out.page = Some(self.page());
        out.per_page = Some(self.per_page());
        out
    }
}

fn validate_coordinates(dto: &CreatePropertyDto) -> Result<(), ValidationError> {
    if dto.latitude.is_some() != dto.longitude.is_some() {
        return Err(ValidationError::new("coordinates")
            .with_message("latitude and longitude must be given together".into()));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[validate(schema(function = "validate_coordinates"))]
pub struct CreatePropertyDto {
    #[validate(length(min = 3, max = 255, message = "Title must be between 3 and 255 characters"))]
    pub title: String,
    #[validate(length(max = 20000))]
    #[serde(default)]
    pub description: String,
    pub property_type: PropertyType,
    pub listing_type: ListingType,
    #[validate(range(min = 0, message = "Price must be positive"))]
    pub price: i64,
    pub price_type_id: Option<i32>,
    #[validate(length(equal = 3, message = "Currency must be a 3 letter code"))]
    pub currency: Option<String>,
    #[validate(range(min = 0.0))]
    pub area: Option<f64>,
    #[validate(range(min = 0, max = 50))]
    pub bedrooms: Option<i32>,
    #[validate(range(min = 0, max = 50))]
    pub bathrooms: Option<i32>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    pub governorate_id: Option<i32>,
    pub city_id: Option<i32>,
    pub neighborhood_id: Option<i32>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    pub status: Option<PropertyStatus>,
    pub is_available: Option<bool>,
    #[serde(default)]
    pub amenity_ids: Vec<i32>,
    #[serde(default)]
    pub feature_ids: Vec<i32>,
    #[serde(default)]
    pub utility_ids: Vec<i32>,
    #[serde(default)]
    pub document_type_ids: Vec<i32>,
}

/// Partial update, absent fields are left untouched.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, Default)]
pub struct UpdatePropertyDto {
    #[validate(length(min = 3, max = 255, message = "Title must be between 3 and 255 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 20000))]
    pub description: Option<String>,
    pub property_type: Option<PropertyType>,
    pub listing_type: Option<ListingType>,
    #[validate(range(min = 0, message = "Price must be positive"))]
    pub price: Option<i64>,
    pub price_type_id: Option<i32>,
    #[validate(length(equal = 3, message = "Currency must be a 3 letter code"))]
    pub currency: Option<String>,
    #[validate(range(min = 0.0))]
    pub area: Option<f64>,
    #[validate(range(min = 0, max = 50))]
    pub bedrooms: Option<i32>,
    #[validate(range(min = 0, max = 50))]
    pub bathrooms: Option<i32>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    pub governorate_id: Option<i32>,
    pub city_id: Option<i32>,
    pub neighborhood_id: Option<i32>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    pub status: Option<PropertyStatus>,
    pub is_available: Option<bool>,
    pub amenity_ids: Option<Vec<i32>>,
    pub feature_ids: Option<Vec<i32>>,
    pub utility_ids: Option<Vec<i32>>,
    pub document_type_ids: Option<Vec<i32>>,
}

/// List card. `description` is only read to build the excerpt.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct PropertyCardDto {
    pub id: i64,
    pub title: String,
    pub slug: String,
    #[serde(skip)]
    pub description: String,
    #[sqlx(default)]
    pub excerpt: String,
    pub property_type: PropertyType,
    pub listing_type: ListingType,
    pub price: i64,
    pub currency: String,
    pub area: Option<f64>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub governorate_id: Option<i32>,
    pub city_id: Option<i32>,
    pub neighborhood_id: Option<i32>,
    pub status: PropertyStatus,
    pub is_available: bool,
    pub is_featured: bool,
    pub views_count: i64,
    /// Storage path from the query, rewritten to a public URL before
    /// leaving the server.
    pub main_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PropertyListResponseDto {
    pub status: String,
    pub data: Vec<PropertyCardDto>,
    pub pagination: PaginationDto,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct OwnerDto {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct TermDto {
    pub id: i32,
    pub name_ar: String,
    pub name_en: String,
    pub name_ku: String,
    pub icon: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow)]
pub struct LocationNameDto {
    pub id: i32,
    pub name_ar: String,
    pub name_en: String,
    pub name_ku: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MediaDto {
    pub id: i64,
    pub uuid: Uuid,
    pub collection: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: i64,
    pub url: String,
    pub conversions: BTreeMap<String, String>,
    pub order: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PropertyTermsDto {
    pub amenities: Vec<TermDto>,
    pub features: Vec<TermDto>,
    pub utilities: Vec<TermDto>,
    pub documents: Vec<TermDto>,
    pub price_type: Option<TermDto>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PropertyDetailDto {
    #[serde(flatten)]
    pub property: crate::models::Property,
    pub owner: OwnerDto,
    pub media: Vec<MediaDto>,
    pub terms: PropertyTermsDto,
    pub governorate: Option<LocationNameDto>,
    pub city: Option<LocationNameDto>,
    pub neighborhood: Option<LocationNameDto>,
    /// Per viewer, never cached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorited: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PropertyResponseDto<T> {
    pub status: String,
    pub data: T,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FavoriteToggleResponseDto {
    pub status: String,
    pub favorited: bool,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct MediaOrderDto {
    #[validate(length(min = 1, max = 100))]
    pub ids: Vec<i64>,
}

// ============================================================================
// Chunked upload DTOs
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaCollection {
    MainImage,
    Images,
}

impl MediaCollection {
    pub fn to_str(&self) -> &'static str {
        match self {
            MediaCollection::MainImage => "main_image",
            MediaCollection::Images => "images",
        }
    }

    /// A new item replaces whatever the collection held.
    pub fn holds_single_item(&self) -> bool {
        matches!(self, MediaCollection::MainImage)
    }

    pub fn parse(value: &str) -> Option<MediaCollection> {
        match value {
            "main_image" => Some(MediaCollection::MainImage),
            "images" => Some(MediaCollection::Images),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct InitUploadDto {
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    #[validate(length(min = 3, max = 100))]
    pub mime_type: String,
    #[validate(range(min = 1))]
    pub size: u64,
    pub property_id: i64,
    pub collection: MediaCollection,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UploadSessionDto {
    pub upload_id: Uuid,
    pub chunk_size: u64,
    pub total_chunks: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChunkAcceptedDto {
    pub status: String,
    pub received: u64,
    pub total_chunks: u64,
}

// ============================================================================
// Dashboard DTOs
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardOverviewDto {
    pub total_properties: i64,
    pub properties_by_status: BTreeMap<String, i64>,
    pub total_views: i64,
    pub favorites_received: i64,
    pub leads_received: i64,
    pub my_favorites: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DashboardPropertiesQuery {
    pub status: Option<PropertyStatus>,
    #[validate(range(min = 1, max = 10000))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 50))]
    pub per_page: Option<i64>,
}

// ============================================================================
// Location, taxonomy and stats DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct LocationQuery {
    #[serde(alias = "governorate_id")]
    pub state_id: Option<i32>,
    pub city_id: Option<i32>,
    pub lang: Option<Lang>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LocationDto {
    pub id: i32,
    pub name: String,
    pub parent_id: Option<i32>,
}

impl LocationDto {
    pub fn localize(location: &Location, lang: Lang) -> Self {
        LocationDto {
            id: location.id,
            name: lang
                .pick(&location.name_ar, &location.name_en, &location.name_ku)
                .to_string(),
            parent_id: location.parent_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LocalizedTermDto {
    pub id: i32,
    pub name: String,
    pub icon: Option<String>,
}

impl LocalizedTermDto {
    pub fn localize(term: &TaxonomyTerm, lang: Lang) -> Self {
        LocalizedTermDto {
            id: term.id,
            name: lang
                .pick(&term.name_ar, &term.name_en, &term.name_ku)
                .to_string(),
            icon: term.icon.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct LangQuery {
    pub lang: Option<Lang>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ListResponseDto<T> {
    pub status: String,
    pub data: Vec<T>,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, Default, PartialEq)]
pub struct StatsOverviewDto {
    pub active_listings: i64,
    pub for_sale: i64,
    pub for_rent: i64,
    pub featured: i64,
    pub owners: i64,
    pub governorates_with_listings: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PriceBucketDto {
    pub min: i64,
    pub max: Option<i64>,
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PriceRangeDto {
    pub listing_type: ListingType,
    pub count: i64,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub avg_price: Option<f64>,
    pub buckets: Vec<PriceBucketDto>,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TermInputDto {
    #[validate(length(min = 1, max = 255, message = "Arabic name is required"))]
    pub name_ar: String,
    #[validate(length(min = 1, max = 255, message = "English name is required"))]
    pub name_en: String,
    #[validate(length(min = 1, max = 255, message = "Kurdish name is required"))]
    pub name_ku: String,
    #[validate(length(max = 255))]
    pub icon: Option<String>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct LocationInputDto {
    #[validate(length(min = 1, max = 255, message = "Arabic name is required"))]
    pub name_ar: String,
    #[validate(length(min = 1, max = 255, message = "English name is required"))]
    pub name_en: String,
    #[validate(length(min = 1, max = 255, message = "Kurdish name is required"))]
    pub name_ku: String,
    pub parent_id: Option<i32>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}

// ============================================================================
// Lead DTOs
// ============================================================================

fn validate_contact(dto: &CreateLeadDto) -> Result<(), ValidationError> {
    let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    if has(&dto.email) || has(&dto.phone) {
        Ok(())
    } else {
        Err(ValidationError::new("contact")
            .with_message("Either email or phone is required".into()))
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[validate(schema(function = "validate_contact"))]
pub struct CreateLeadDto {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Email is invalid"))]
    pub email: Option<String>,
    #[validate(length(min = 6, max = 32, message = "Phone number is invalid"))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 5000, message = "Message is required"))]
    pub message: String,
    pub property_id: Option<i64>,
    #[validate(length(max = 64))]
    pub source: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeadStatusUpdateDto {
    pub status: LeadStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeadAssignDto {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LeadNotesDto {
    #[validate(length(max = 10000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate, Default)]
pub struct LeadsQuery {
    pub status: Option<LeadStatus>,
    pub property_id: Option<i64>,
    #[validate(range(min = 1, max = 10000))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LeadListResponseDto {
    pub status: String,
    pub data: Vec<Lead>,
    pub pagination: PaginationDto,
}

// ============================================================================
// Admin DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate, Default)]
pub struct AdminPropertiesQuery {
    pub status: Option<PropertyStatus>,
    #[validate(length(max = 100))]
    pub q: Option<String>,
    pub user_id: Option<Uuid>,
    pub featured: Option<bool>,
    #[validate(range(min = 1, max = 10000))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub per_page: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusUpdateDto {
    pub status: PropertyStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Activate,
    Deactivate,
    Feature,
    Unfeature,
    Delete,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct BulkActionDto {
    #[validate(length(min = 1, max = 100, message = "Select between 1 and 100 properties"))]
    pub ids: Vec<i64>,
    pub action: BulkAction,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkActionResponseDto {
    pub status: String,
    pub affected: u64,
}

#[derive(Debug, Deserialize, Validate, Default)]
pub struct AdminUsersQuery {
    pub user_type: Option<UserType>,
    pub active: Option<bool>,
    #[validate(length(max = 100))]
    pub q: Option<String>,
    #[validate(range(min = 1, max = 10000))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AdminLocationQuery {
    pub parent_id: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserTypeUpdateDto {
    pub user_type: UserType,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct CountByKeyDto {
    pub key: String,
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminDashboardDto {
    pub users_by_type: BTreeMap<String, i64>,
    pub properties_by_status: BTreeMap<String, i64>,
    pub leads_by_status: BTreeMap<String, i64>,
    pub listings_per_month: Vec<CountByKeyDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportsDto {
    pub listings_per_governorate: Vec<CountByKeyDto>,
    pub listings_per_type: Vec<CountByKeyDto>,
    pub leads_total: i64,
    pub leads_qualified: i64,
    pub lead_conversion_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_rounds_up() {
        assert_eq!(PaginationDto::new(1, 12, 0).total_pages, 0);
        assert_eq!(PaginationDto::new(1, 12, 12).total_pages, 1);
        assert_eq!(PaginationDto::new(1, 12, 13).total_pages, 2);
    }

    #[test]
    fn only_the_main_image_is_replaced() {
        assert!(MediaCollection::MainImage.holds_single_item());
        assert!(!MediaCollection::Images.holds_single_item());
    }

    #[test]
    fn page_numbers_are_bounded() {
        let page = |page| PropertyFilters {
            page: Some(page),
            ..Default::default()
        };
        assert!(page(1).validate().is_ok());
        assert!(page(10000).validate().is_ok());
        assert!(page(0).validate().is_err());
        assert!(page(10001).validate().is_err());
    }

    #[test]
    fn id_list_parsing() {
        assert_eq!(parse_id_list("3, 1,3,,"), Some(vec![1, 3]));
        assert_eq!(parse_id_list(""), Some(vec![]));
        assert_eq!(parse_id_list("1,x"), None);
    }

    #[test]
    fn equivalent_filters_normalize_identically() {
        let a = PropertyFilters {
            q: Some("  Villa ".into()),
            amenities: Some("5,2".into()),
            ..Default::default()
        };
        let b = PropertyFilters {
            q: Some("villa".into()),
            amenities: Some("2, 5".into()),
            sort: Some(PropertySort::Newest),
            page: Some(1),
            per_page: Some(DEFAULT_PER_PAGE),
            ..Default::default()
        };
        assert_eq!(a.normalized(), b.normalized());
    }

    #[test]
    fn inverted_price_range_is_rejected() {
        let filters = PropertyFilters {
            min_price: Some(900),
            max_price: Some(100),
            ..Default::default()
        };
        assert!(filters.validate().is_err());
    }

    #[test]
    fn register_requires_matching_passwords() {
        let dto = RegisterUserDto {
            name: "Ava".into(),
            email: "ava@example.com".into(),
            password: "password123".into(),
            password_confirmation: "password124".into(),
            ..Default::default()
        };
        let errors = dto.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("password_confirmation"));
    }

    #[test]
    fn self_registration_cannot_pick_admin() {
        let raw = r#"{"name":"x","email":"x@example.com","password":"password123",
            "password_confirmation":"password123","user_type":"admin"}"#;
        assert!(serde_json::from_str::<RegisterUserDto>(raw).is_err());

        let raw = raw.replace("\"admin\"", "\"property_owner\"");
        let dto: RegisterUserDto = serde_json::from_str(&raw).unwrap();
        assert_eq!(UserType::from(dto.user_type), UserType::PropertyOwner);
    }

    #[test]
    fn lead_needs_email_or_phone() {
        let mut lead = CreateLeadDto {
            name: "Sara".into(),
            email: None,
            phone: None,
            message: "Is it still available?".into(),
            property_id: Some(1),
            source: None,
        };
        assert!(lead.validate().is_err());
        lead.phone = Some("+9647500000000".into());
        assert!(lead.validate().is_ok());
    }

    #[test]
    fn lang_falls_back_to_english() {
        assert_eq!(Lang::Ku.pick("عربي", "English", ""), "English");
        assert_eq!(Lang::Ar.pick("عربي", "English", ""), "عربي");
    }
}
