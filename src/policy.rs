//! Authorization rules for listings, shared by every handler that writes.

use crate::error::{ErrorMessage, HttpError};
use crate::models::{Property, PropertyStatus, User};

pub fn can_modify(user: &User, property: &Property) -> bool {
    property.is_owned_by(user) || user.user_type.is_staff()
}

/// 403 unless the user may publish listings at all.
pub fn ensure_can_create(user: &User) -> Result<(), HttpError> {
    if user.can_create_listings() {
        Ok(())
    } else {
        Err(HttpError::forbidden(ErrorMessage::ListingNotAllowed.to_string()))
    }
}

/// 403 unless the user owns the listing or is staff.
pub fn ensure_can_modify(user: &User, property: &Property) -> Result<(), HttpError> {
    if can_modify(user, property) {
        Ok(())
    } else {
        tracing::warn!(user_id = %user.id, property_id = property.id, "Rejected write on foreign listing");
        Err(HttpError::forbidden(ErrorMessage::NotPropertyOwner.to_string()))
    }
}

/// Owners may move their listing between any status except `active`,
/// which only staff can grant.
pub fn ensure_status_allowed(user: &User, status: PropertyStatus) -> Result<(), HttpError> {
    if user.user_type.is_staff() || status.settable_by_owner() {
        Ok(())
    } else {
        Err(HttpError::field(
            "status",
            "Listings go live once an administrator approves them",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{UserType, fixtures};
    use axum::http::StatusCode;

    #[test]
    fn only_owner_or_staff_may_modify() {
        let owner = fixtures::user(UserType::PropertyOwner);
        let stranger = fixtures::user(UserType::PropertyOwner);
        let admin = fixtures::user(UserType::Admin);
        let listing = fixtures::property(&owner, PropertyStatus::Active, true);

        assert!(ensure_can_modify(&owner, &listing).is_ok());
        assert!(ensure_can_modify(&admin, &listing).is_ok());
        assert_eq!(
            ensure_can_modify(&stranger, &listing).unwrap_err().status,
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn listing_creation_requires_verified_active_owner() {
        let mut owner = fixtures::user(UserType::PropertyOwner);
        assert!(ensure_can_create(&owner).is_ok());

        owner.is_verified = false;
        assert_eq!(
            ensure_can_create(&owner).unwrap_err().status,
            StatusCode::FORBIDDEN
        );

        let buyer = fixtures::user(UserType::GeneralUser);
        assert!(ensure_can_create(&buyer).is_err());
        assert!(ensure_can_create(&fixtures::user(UserType::SuperAdmin)).is_ok());
    }

    #[test]
    fn owners_cannot_activate() {
        let owner = fixtures::user(UserType::PropertyOwner);
        let admin = fixtures::user(UserType::Admin);

        let err = ensure_status_allowed(&owner, PropertyStatus::Active).unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(ensure_status_allowed(&owner, PropertyStatus::Sold).is_ok());
        assert!(ensure_status_allowed(&admin, PropertyStatus::Active).is_ok());
    }
}
