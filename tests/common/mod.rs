#![allow(dead_code)]

use agrirent::backend::{Backend, ListingQuery};
use agrirent::model::{
    AuthEvent, BookingRecord, Identity, Listing, ListingCategory, ListingStatus, NewListing,
    Notification, PaymentOption, Profile, Role, Session, SignUpProfile, UserView,
};
use agrirent::notify::{NotificationKind, NotificationSink, Notifier};
use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

pub fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

pub fn listing(n: u128, name: &str, owner: Uuid, status: ListingStatus) -> Listing {
    Listing {
        id: id(n),
        name: name.into(),
        category: ListingCategory::Tractor,
        owner_id: owner,
        owner_name: None,
        region: "Punjab".into(),
        daily_rate: 450.0,
        status,
        description: None,
        image_url: None,
        created_at: None,
    }
}

pub fn user(n: u128, name: &str, role: Role) -> UserView {
    UserView {
        id: id(n),
        name: name.into(),
        email: Some(format!("{}@farm.io", name.to_lowercase())),
        role,
        phone: Some("+1234567890".into()),
        region: None,
    }
}

pub fn session_for(n: u128, email: &str) -> Session {
    Session {
        access_token: format!("token-{}", n),
        refresh_token: format!("refresh-{}", n),
        expires_at: None,
        user: Identity {
            id: id(n),
            email: Some(email.into()),
        },
    }
}

pub fn profile(n: u128, name: &str) -> Profile {
    Profile {
        id: Some(id(n)),
        display_name: Some(name.into()),
        ..Default::default()
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn booking(
    n: u128,
    customer: Uuid,
    start: &str,
    end: &str,
    total: f64,
    status: &str,
) -> BookingRecord {
    let (start_date, end_date) = (date(start), date(end));
    BookingRecord {
        booking_id: format!("BK{}", n),
        listing_id: id(n),
        owner_id: id(100),
        customer_id: Some(customer),
        full_name: "Sarah".into(),
        email: "sarah@farm.io".into(),
        phone: "+1234567890".into(),
        address: "12 Valley Rd".into(),
        farm_size: None,
        purpose: None,
        special_requirements: None,
        start_date,
        end_date,
        duration_days: (end_date - start_date).num_days() as u32,
        payment_option: PaymentOption::Full,
        total_amount: total,
        payable_amount: total,
        status: status.into(),
        created_at: Utc::now(),
    }
}

/// Collects notifications for assertions.
#[derive(Default)]
pub struct RecordingSink(StdMutex<Vec<(NotificationKind, String)>>);

impl RecordingSink {
    pub fn messages(&self) -> Vec<(NotificationKind, String)> {
        self.0.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|(_, m)| m).collect()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, kind: NotificationKind, message: &str) {
        self.0.lock().unwrap().push((kind, message.to_string()));
    }
}

pub fn recording_notifier() -> (Notifier, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    (Notifier::new().with_sink(sink.clone()), sink)
}

/// In-memory backend that records every call it receives.
#[derive(Clone)]
pub struct RecordingBackend {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub roles: Arc<Mutex<HashMap<Uuid, Vec<String>>>>,
    pub profiles: Arc<Mutex<HashMap<Uuid, Profile>>>,
    /// Users whose session no longer has an identity.
    pub unknown_identities: Arc<Mutex<Vec<Uuid>>>,
    /// Users whose identity lookup errors.
    pub failing_identities: Arc<Mutex<Vec<Uuid>>>,
    /// Users whose role lookup errors.
    pub failing_role_lookups: Arc<Mutex<Vec<Uuid>>>,
    /// Artificial latency on role lookups, per user.
    pub role_delays: Arc<Mutex<HashMap<Uuid, Duration>>>,
    pub listings: Arc<Mutex<Vec<Listing>>>,
    pub notifications: Arc<Mutex<Vec<Notification>>>,
    pub bookings: Arc<Mutex<Vec<BookingRecord>>>,
    pub booking_failures: Arc<Mutex<VecDeque<anyhow::Error>>>,
    pub accounts: Arc<Mutex<HashMap<String, (String, Session)>>>,
    pub signups: Arc<Mutex<Vec<(String, SignUpProfile)>>>,
    session: Arc<Mutex<Option<Session>>>,
    events: broadcast::Sender<AuthEvent>,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            calls: Default::default(),
            roles: Default::default(),
            profiles: Default::default(),
            unknown_identities: Default::default(),
            failing_identities: Default::default(),
            failing_role_lookups: Default::default(),
            role_delays: Default::default(),
            listings: Default::default(),
            notifications: Default::default(),
            bookings: Default::default(),
            booking_failures: Default::default(),
            accounts: Default::default(),
            signups: Default::default(),
            session: Default::default(),
            events,
        }
    }
}

impl RecordingBackend {
    pub async fn with_user(self, n: u128, name: &str, roles: &[&str]) -> Self {
        self.roles
            .lock()
            .await
            .insert(id(n), roles.iter().map(|r| r.to_string()).collect());
        self.profiles.lock().await.insert(id(n), profile(n, name));
        self
    }

    pub async fn with_account(self, n: u128, email: &str, password: &str) -> Self {
        self.accounts
            .lock()
            .await
            .insert(email.into(), (password.into(), session_for(n, email)));
        self
    }

    pub async fn with_listings(self, listings: Vec<Listing>) -> Self {
        self.listings.lock().await.extend(listings);
        self
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    pub async fn calls_named(&self, name: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.as_str() == name)
            .count()
    }

    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    async fn record(&self, call: &str) {
        self.calls.lock().await.push(call.to_string());
    }
}

#[async_trait::async_trait]
impl Backend for RecordingBackend {
    async fn current_identity(&self, session: &Session) -> Result<Option<Identity>> {
        self.record("current_identity").await;
        if self.failing_identities.lock().await.contains(&session.user.id) {
            return Err(anyhow!("identity lookup failed"));
        }
        if self.unknown_identities.lock().await.contains(&session.user.id) {
            return Ok(None);
        }
        Ok(Some(session.user.clone()))
    }

    async fn role_assignments(&self, user_id: Uuid) -> Result<Vec<String>> {
        self.record("role_assignments").await;
        if self.failing_role_lookups.lock().await.contains(&user_id) {
            return Err(anyhow!("permission denied for table user_roles"));
        }
        let delay = self.role_delays.lock().await.get(&user_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .roles
            .lock()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        self.record("profile").await;
        Ok(self.profiles.lock().await.get(&user_id).cloned())
    }

    async fn profiles_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Profile>> {
        self.record("profiles_by_ids").await;
        let profiles = self.profiles.lock().await;
        Ok(ids.iter().filter_map(|i| profiles.get(i).cloned()).collect())
    }

    async fn list_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>> {
        self.record("list_listings").await;
        Ok(self
            .listings
            .lock()
            .await
            .iter()
            .filter(|l| query.status.map_or(true, |s| l.status == s))
            .filter(|l| query.owner_id.map_or(true, |o| l.owner_id == o))
            .cloned()
            .collect())
    }

    async fn insert_listing(&self, owner_id: Uuid, fields: &NewListing) -> Result<Listing> {
        self.record("insert_listing").await;
        let mut listings = self.listings.lock().await;
        let created = Listing {
            id: id(1000 + listings.len() as u128),
            name: fields.name.clone(),
            category: fields.category,
            owner_id,
            owner_name: None,
            region: fields.region.clone(),
            daily_rate: fields.daily_rate,
            status: ListingStatus::Pending,
            description: fields.description.clone(),
            image_url: fields.image_url.clone(),
            created_at: None,
        };
        listings.push(created.clone());
        Ok(created)
    }

    async fn update_listing_status(&self, listing_id: Uuid, status: ListingStatus) -> Result<()> {
        self.record("update_listing_status").await;
        let mut listings = self.listings.lock().await;
        let listing = listings
            .iter_mut()
            .find(|l| l.id == listing_id)
            .ok_or_else(|| anyhow!("no listing {}", listing_id))?;
        listing.status = status;
        Ok(())
    }

    async fn delete_listing(&self, listing_id: Uuid) -> Result<()> {
        self.record("delete_listing").await;
        self.listings.lock().await.retain(|l| l.id != listing_id);
        Ok(())
    }

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        self.record("list_notifications").await;
        Ok(self
            .notifications
            .lock()
            .await
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_notification_read(&self, notification_id: Uuid) -> Result<()> {
        self.record("mark_notification_read").await;
        for n in self.notifications.lock().await.iter_mut() {
            if n.id == notification_id {
                n.is_read = true;
            }
        }
        Ok(())
    }

    async fn insert_booking(&self, booking: &BookingRecord) -> Result<()> {
        self.record("insert_booking").await;
        if let Some(err) = self.booking_failures.lock().await.pop_front() {
            return Err(err);
        }
        self.bookings.lock().await.push(booking.clone());
        Ok(())
    }

    async fn list_bookings(&self, customer_id: Uuid) -> Result<Vec<BookingRecord>> {
        self.record("list_bookings").await;
        Ok(self
            .bookings
            .lock()
            .await
            .iter()
            .filter(|b| b.customer_id == Some(customer_id))
            .cloned()
            .collect())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        self.record("sign_in").await;
        let accounts = self.accounts.lock().await;
        let session = match accounts.get(email) {
            Some((expected, session)) if expected == password => session.clone(),
            _ => return Err(anyhow!("Invalid login credentials")),
        };
        *self.session.lock().await = Some(session.clone());
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, _password: &str, profile: &SignUpProfile) -> Result<()> {
        self.record("sign_up").await;
        self.signups
            .lock()
            .await
            .push((email.to_string(), profile.clone()));
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        self.record("sign_out").await;
        *self.session.lock().await = None;
        self.emit(AuthEvent::SignedOut);
        Ok(())
    }

    async fn session(&self) -> Option<Session> {
        self.session.lock().await.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
