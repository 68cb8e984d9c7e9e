use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ListingCategory {
    Tractor,
    Harvester,
    Plow,
    Seeder,
    Sprayer,
    Truck,
    Other,
}

impl ListingCategory {
    pub const ALL: [ListingCategory; 7] = [
        ListingCategory::Tractor,
        ListingCategory::Harvester,
        ListingCategory::Plow,
        ListingCategory::Seeder,
        ListingCategory::Sprayer,
        ListingCategory::Truck,
        ListingCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListingCategory::Tractor => "Tractor",
            ListingCategory::Harvester => "Harvester",
            ListingCategory::Plow => "Plow",
            ListingCategory::Seeder => "Seeder",
            ListingCategory::Sprayer => "Sprayer",
            ListingCategory::Truck => "Truck",
            ListingCategory::Other => "Other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for ListingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown equipment category '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Pending,
    Available,
    Booked,
    Cancelled,
    Maintenance,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Pending => "pending",
            ListingStatus::Available => "available",
            ListingStatus::Booked => "booked",
            ListingStatus::Cancelled => "cancelled",
            ListingStatus::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A piece of equipment offered for rent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: Uuid,
    pub name: String,
    pub category: ListingCategory,
    pub owner_id: Uuid,
    /// Owner display name, present once the listing has been enriched with profiles.
    pub owner_name: Option<String>,
    pub region: String,
    pub daily_rate: f64,
    pub status: ListingStatus,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Listing {
    /// Name used when talking about the owner to a customer.
    pub fn owner_label(&self) -> &str {
        self.owner_name.as_deref().unwrap_or("the equipment owner")
    }
}

/// Fields an owner submits for a new listing.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewListing {
    pub name: String,
    pub category: ListingCategory,
    pub description: Option<String>,
    pub daily_rate: f64,
    pub region: String,
    pub image_url: Option<String>,
}

/// Role tags as stored in role-assignment rows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Owner,
    Farmer,
    User,
}

impl Role {
    pub fn tag(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Owner => "owner",
            Role::Farmer => "farmer",
            Role::User => "user",
        }
    }

    /// Display label shown to users.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Owner => "Machine Owner",
            Role::Farmer => "Farmer",
            Role::User => "User",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "owner" => Some(Role::Owner),
            "farmer" => Some(Role::Farmer),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The signed-in user as the rest of the application sees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserView {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
    pub phone: Option<String>,
    pub region: Option<String>,
}

/// Auth identity record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Profile row owned by the hosted service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: Option<Uuid>,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub region: Option<String>,
}

/// Profile fields sent along with a sign-up.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SignUpProfile {
    pub display_name: String,
    pub phone: Option<String>,
    pub region: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: Identity,
}

/// Auth-state transitions delivered by the hosted provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    InitialSession(Option<Session>),
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
}

impl AuthEvent {
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthEvent::InitialSession(session) => session.as_ref(),
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => Some(session),
            AuthEvent::SignedOut => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: Option<DateTime<Utc>>,
}

pub fn unread_count(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.is_read).count()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOption {
    #[default]
    Advance,
    Full,
}

impl PaymentOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOption::Advance => "advance",
            PaymentOption::Full => "full",
        }
    }
}

impl FromStr for PaymentOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "advance" => Ok(PaymentOption::Advance),
            "full" => Ok(PaymentOption::Full),
            other => Err(format!("unknown payment option '{}'", other)),
        }
    }
}

/// Booking as stored by the hosted service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingRecord {
    pub booking_id: String,
    pub listing_id: Uuid,
    pub owner_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub farm_size: Option<String>,
    pub purpose: Option<String>,
    pub special_requirements: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_days: u32,
    pub payment_option: PaymentOption,
    pub total_amount: f64,
    pub payable_amount: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl BookingRecord {
    pub const CONFIRMED: &'static str = "confirmed";
    pub const COMPLETED: &'static str = "completed";
    pub const CANCELLED: &'static str = "cancelled";

    pub fn is_cancelled(&self) -> bool {
        self.status.eq_ignore_ascii_case(Self::CANCELLED)
    }

    /// Upcoming or running on `today`, and neither finished nor cancelled.
    pub fn is_active(&self, today: NaiveDate) -> bool {
        !self.is_cancelled()
            && !self.status.eq_ignore_ascii_case(Self::COMPLETED)
            && self.end_date >= today
    }
}
