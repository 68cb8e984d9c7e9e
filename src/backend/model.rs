//! Row shapes exchanged with the hosted data and auth APIs.
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::model::{
    Identity, Listing, ListingCategory, ListingStatus, NewListing, Profile, Session,
};

#[derive(Deserialize, Debug, Clone)]
pub struct EquipmentRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub daily_rate: f64,
    pub location: String,
    pub image_url: Option<String>,
    pub status: ListingStatus,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<EquipmentRow> for Listing {
    fn from(row: EquipmentRow) -> Self {
        let category = ListingCategory::parse(&row.category)
            .or_else(|| {
                row.category
                    .trim()
                    .strip_suffix('s')
                    .and_then(ListingCategory::parse)
            })
            .unwrap_or_else(|| {
                warn!(id = %row.id, category = %row.category, "unknown equipment category");
                ListingCategory::Other
            });
        Listing {
            id: row.id,
            name: row.name,
            category,
            owner_id: row.owner_id,
            owner_name: None,
            region: row.location,
            daily_rate: row.daily_rate,
            status: row.status,
            description: row.description,
            image_url: row.image_url,
            created_at: row.created_at,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct NewEquipmentRow<'a> {
    pub owner_id: Uuid,
    pub name: &'a str,
    pub category: &'static str,
    pub description: Option<&'a str>,
    pub daily_rate: f64,
    pub location: &'a str,
    pub image_url: Option<&'a str>,
    pub status: ListingStatus,
}

impl<'a> NewEquipmentRow<'a> {
    /// New submissions always start out pending approval.
    pub fn pending(owner_id: Uuid, fields: &'a NewListing) -> Self {
        Self {
            owner_id,
            name: &fields.name,
            category: fields.category.as_str(),
            description: fields.description.as_deref(),
            daily_rate: fields.daily_rate,
            location: &fields.region,
            image_url: fields.image_url.as_deref(),
            status: ListingStatus::Pending,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct RoleRow {
    pub role: String,
}

#[derive(Deserialize, Debug)]
pub struct ProfileRow {
    pub id: Uuid,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            id: Some(row.id),
            display_name: row.display_name.filter(|n| !n.trim().is_empty()),
            phone: row.phone,
            region: row.location,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

impl From<AuthUser> for Identity {
    fn from(user: AuthUser) -> Self {
        Identity {
            id: user.id,
            email: user.email,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Option<i64>,
    pub user: AuthUser,
}

impl TokenResponse {
    pub fn into_session(self, now: DateTime<Utc>) -> Session {
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_in.map(|secs| now + Duration::seconds(secs)),
            user: self.user.into(),
        }
    }
}
