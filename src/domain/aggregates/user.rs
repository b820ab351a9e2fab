//! Shop users. Credentials and sessions live outside this service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::product::contains_ci;
use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub address: Option<String>,
    pub is_admin: bool,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn acts_as_admin(&self) -> bool { self.is_admin && self.is_active }
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub phone_number: String,
    pub address: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct UpdateUser {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1))]
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub is_admin: Option<bool>,
    pub is_active: Option<bool>,
}

/// Rejects a change to an admin-only field unless `actor` is an active admin.
///
/// No actor at all is Unauthenticated; a known actor without admin rights is Forbidden.
pub fn require_admin(field: &str, actor: Option<&User>) -> Result<()> {
    match actor {
        None => Err(Error::unauthenticated(format!("{field} can only be set by an identified admin"))),
        Some(user) if !user.acts_as_admin() => Err(Error::forbidden(format!("only admin can update {field} field"))),
        Some(_) => Ok(()),
    }
}

impl UpdateUser {
    /// First admin-only field the update touches.
    pub fn admin_field(&self) -> Option<&'static str> {
        if self.is_admin.is_some() {
            Some("is_admin")
        } else if self.is_active.is_some() {
            Some("is_active")
        } else {
            None
        }
    }

    pub fn authorize(&self, actor: Option<&User>) -> Result<()> {
        match self.admin_field() {
            Some(field) => require_admin(field, actor),
            None => Ok(()),
        }
    }

    pub fn apply_to(&self, user: &mut User) {
        if let Some(v) = &self.name { user.name = v.clone(); }
        if let Some(v) = &self.phone_number { user.phone_number = v.clone(); }
        if let Some(v) = &self.address { user.address = Some(v.clone()); }
        if let Some(v) = self.is_admin { user.is_admin = v; }
        if let Some(v) = self.is_active { user.is_active = v; }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserFilter {
    pub search: Option<String>,
    pub is_admin: Option<bool>,
    pub is_active: Option<bool>,
}

impl UserFilter {
    pub fn admins() -> Self { Self { is_admin: Some(true), ..Self::default() } }

    pub fn matches(&self, user: &User) -> bool {
        self.search
            .as_deref()
            .map_or(true, |q| contains_ci(&user.name, q) || contains_ci(&user.email, q) || contains_ci(&user.phone_number, q))
            && self.is_admin.map_or(true, |a| user.is_admin == a)
            && self.is_active.map_or(true, |a| user.is_active == a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn user(is_admin: bool, is_active: bool) -> User {
        User {
            id: Uuid::now_v7(),
            name: "Ada Obi".into(),
            email: "ada@example.com".into(),
            phone_number: "08030000000".into(),
            address: None,
            is_admin,
            is_active,
            deleted_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_profile_fields_need_no_admin() {
        let update = UpdateUser { name: Some("Ada".into()), address: Some("Lekki".into()), ..Default::default() };
        assert!(update.authorize(None).is_ok());
    }

    #[test]
    fn test_admin_fields_need_an_active_admin() {
        let promote = UpdateUser { is_admin: Some(true), ..Default::default() };
        assert_eq!(promote.authorize(None).unwrap_err().kind(), ErrorKind::Unauthenticated);
        assert_eq!(promote.authorize(Some(&user(false, true))).unwrap_err().kind(), ErrorKind::Forbidden);
        assert_eq!(promote.authorize(Some(&user(true, false))).unwrap_err().kind(), ErrorKind::Forbidden);
        assert!(promote.authorize(Some(&user(true, true))).is_ok());

        let deactivate = UpdateUser { is_active: Some(false), ..Default::default() };
        let err = deactivate.authorize(Some(&user(false, true))).unwrap_err();
        assert_eq!(err.message(), "only admin can update is_active field");
    }

    #[test]
    fn test_filter_search_covers_email() {
        let filter = UserFilter { search: Some("EXAMPLE".into()), ..Default::default() };
        assert!(filter.matches(&user(false, true)));
        assert!(!UserFilter::admins().matches(&user(false, true)));
    }
}
