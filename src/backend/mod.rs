use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::model::{
    AuthUser, EquipmentRow, NewEquipmentRow, ProfileRow, RoleRow, TokenResponse,
};
use crate::model::{
    AuthEvent, BookingRecord, Identity, Listing, ListingStatus, NewListing, Notification,
    Profile, Session, SignUpProfile,
};

pub mod model;

const AUTH_EVENT_CAPACITY: usize = 16;

/// Selection for listing reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingQuery {
    pub status: Option<ListingStatus>,
    pub owner_id: Option<Uuid>,
}

impl ListingQuery {
    pub fn with_status(status: ListingStatus) -> Self {
        Self {
            status: Some(status),
            owner_id: None,
        }
    }

    pub fn owned_by(owner_id: Uuid) -> Self {
        Self {
            status: None,
            owner_id: Some(owner_id),
        }
    }
}

/// Operations consumed from the hosted auth and data service.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn current_identity(&self, session: &Session) -> Result<Option<Identity>>;

    async fn role_assignments(&self, user_id: Uuid) -> Result<Vec<String>>;

    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>>;

    async fn profiles_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Profile>>;

    async fn list_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>>;

    async fn insert_listing(&self, owner_id: Uuid, fields: &NewListing) -> Result<Listing>;

    async fn update_listing_status(&self, listing_id: Uuid, status: ListingStatus) -> Result<()>;

    async fn delete_listing(&self, listing_id: Uuid) -> Result<()>;

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>>;

    async fn mark_notification_read(&self, notification_id: Uuid) -> Result<()>;

    async fn insert_booking(&self, booking: &BookingRecord) -> Result<()>;

    /// Bookings made by one customer, newest first.
    async fn list_bookings(&self, customer_id: Uuid) -> Result<Vec<BookingRecord>>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    async fn sign_up(&self, email: &str, password: &str, profile: &SignUpProfile) -> Result<()>;

    async fn sign_out(&self) -> Result<()>;

    async fn session(&self) -> Option<Session>;

    /// Auth-state changes, delivered in provider order.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// HTTP client for the hosted service's REST (`rest/v1`) and auth (`auth/v1`) APIs.
#[derive(Clone)]
pub struct HostedClient {
    http: Client,
    base_url: Url,
    anon_key: String,
    session: Arc<RwLock<Option<Session>>>,
    events: broadcast::Sender<AuthEvent>,
}

impl fmt::Debug for HostedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HostedClient {
    pub fn new(base_url: Url, anon_key: String) -> Result<Self> {
        let http = Client::builder()
            .user_agent("agrirent/0.1")
            .build()
            .context("failed to build HTTP client")?;
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Ok(Self {
            http,
            base_url,
            anon_key,
            session: Arc::new(RwLock::new(None)),
            events,
        })
    }

    /// Install a previously persisted session and announce it.
    pub async fn restore_session(&self, session: Option<Session>) {
        *self.session.write().await = session.clone();
        let _ = self.events.send(AuthEvent::InitialSession(session));
    }

    /// Start a request with the API key and the given bearer token.
    pub fn request(&self, method: Method, path: &str, bearer: &str) -> Result<RequestBuilder> {
        let endpoint = self
            .base_url
            .join(path)
            .with_context(|| format!("invalid endpoint path {}", path))?;
        Ok(self
            .http
            .request(method, endpoint)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer)))
    }

    async fn bearer(&self) -> String {
        match self.session.read().await.as_ref() {
            Some(session) => session.access_token.clone(),
            None => self.anon_key.clone(),
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let request = builder
            .build()
            .with_context(|| format!("failed to build {} request", what))?;
        debug!(method = %request.method(), url = %request.url(), "sending request");
        let res = self
            .http
            .execute(request)
            .await
            .with_context(|| format!("failed to reach backend for {}", what))?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!(what, "rate limited by backend: {}", body);
            return Err(anyhow!("received 429 for {}: {}", what, body));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(what, %status, "backend error: {}", body);
            return Err(anyhow!("{} failed ({}): {}", what, status, error_message(&body)));
        }
        Ok(res)
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let res = self.send(builder, what).await?;
        res.json::<T>()
            .await
            .with_context(|| format!("invalid response for {}", what))
    }

    async fn rest(&self, method: Method, table: &str) -> Result<RequestBuilder> {
        let bearer = self.bearer().await;
        self.request(method, &format!("rest/v1/{}", table), &bearer)
    }
}

/// Pull a human-readable message out of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["msg", "message", "error_description", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}

/// Query parameters for a listing read, newest first.
pub fn listing_params(query: &ListingQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![("select", "*".to_string())];
    if let Some(status) = query.status {
        params.push(("status", format!("eq.{}", status.as_str())));
    }
    if let Some(owner) = query.owner_id {
        params.push(("owner_id", format!("eq.{}", owner)));
    }
    params.push(("order", "created_at.desc".to_string()));
    params
}

pub fn booking_params(customer_id: Uuid) -> Vec<(&'static str, String)> {
    vec![
        ("select", "*".to_string()),
        ("customer_id", format!("eq.{}", customer_id)),
        ("order", "created_at.desc".to_string()),
    ]
}

fn id_list(ids: &[Uuid]) -> String {
    let joined: Vec<String> = ids.iter().map(Uuid::to_string).collect();
    format!("in.({})", joined.join(","))
}

#[async_trait]
impl Backend for HostedClient {
    async fn current_identity(&self, session: &Session) -> Result<Option<Identity>> {
        let builder = self.request(Method::GET, "auth/v1/user", &session.access_token)?;
        let request = builder.build().context("failed to build identity request")?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach backend for identity")?;
        if matches!(res.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Ok(None);
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("identity lookup failed ({}): {}", status, error_message(&body)));
        }
        let user: AuthUser = res.json().await.context("invalid identity response")?;
        Ok(Some(user.into()))
    }

    async fn role_assignments(&self, user_id: Uuid) -> Result<Vec<String>> {
        let builder = self
            .rest(Method::GET, "user_roles")
            .await?
            .query(&[("select", "role".to_string()), ("user_id", format!("eq.{}", user_id))]);
        let rows: Vec<RoleRow> = self.fetch(builder, "role assignments").await?;
        Ok(rows.into_iter().map(|r| r.role).collect())
    }

    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        let builder = self.rest(Method::GET, "profiles").await?.query(&[
            ("select", "id,display_name,phone,location".to_string()),
            ("id", format!("eq.{}", user_id)),
        ]);
        let rows: Vec<ProfileRow> = self.fetch(builder, "profile").await?;
        Ok(rows.into_iter().next().map(Profile::from))
    }

    async fn profiles_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Profile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let builder = self.rest(Method::GET, "profiles").await?.query(&[
            ("select", "id,display_name,phone,location".to_string()),
            ("id", id_list(ids)),
        ]);
        let rows: Vec<ProfileRow> = self.fetch(builder, "profiles").await?;
        Ok(rows.into_iter().map(Profile::from).collect())
    }

    async fn list_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>> {
        let builder = self
            .rest(Method::GET, "equipment")
            .await?
            .query(&listing_params(query));
        let rows: Vec<EquipmentRow> = self.fetch(builder, "listings").await?;
        Ok(rows.into_iter().map(Listing::from).collect())
    }

    async fn insert_listing(&self, owner_id: Uuid, fields: &NewListing) -> Result<Listing> {
        let row = NewEquipmentRow::pending(owner_id, fields);
        let builder = self
            .rest(Method::POST, "equipment")
            .await?
            .header("Prefer", "return=representation")
            .json(&row);
        let rows: Vec<EquipmentRow> = self.fetch(builder, "insert listing").await?;
        let created = rows
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("insert listing returned no row"))?;
        info!(id = %created.id, "listing submitted for approval");
        Ok(created.into())
    }

    async fn update_listing_status(&self, listing_id: Uuid, status: ListingStatus) -> Result<()> {
        let builder = self
            .rest(Method::PATCH, "equipment")
            .await?
            .query(&[("id", format!("eq.{}", listing_id))])
            .json(&json!({ "status": status }));
        self.send(builder, "update listing status").await?;
        Ok(())
    }

    async fn delete_listing(&self, listing_id: Uuid) -> Result<()> {
        let builder = self
            .rest(Method::DELETE, "equipment")
            .await?
            .query(&[("id", format!("eq.{}", listing_id))]);
        self.send(builder, "delete listing").await?;
        Ok(())
    }

    async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        let builder = self.rest(Method::GET, "notifications").await?.query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", user_id)),
            ("order", "created_at.desc".to_string()),
        ]);
        self.fetch(builder, "notifications").await
    }

    async fn mark_notification_read(&self, notification_id: Uuid) -> Result<()> {
        let builder = self
            .rest(Method::PATCH, "notifications")
            .await?
            .query(&[("id", format!("eq.{}", notification_id))])
            .json(&json!({ "is_read": true }));
        self.send(builder, "mark notification read").await?;
        Ok(())
    }

    async fn insert_booking(&self, booking: &BookingRecord) -> Result<()> {
        let builder = self.rest(Method::POST, "bookings").await?.json(booking);
        self.send(builder, "create booking").await?;
        Ok(())
    }

    async fn list_bookings(&self, customer_id: Uuid) -> Result<Vec<BookingRecord>> {
        let builder = self
            .rest(Method::GET, "bookings")
            .await?
            .query(&booking_params(customer_id));
        self.fetch(builder, "bookings").await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let builder = self
            .request(Method::POST, "auth/v1/token", &self.anon_key)?
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        let token: TokenResponse = self.fetch(builder, "sign in").await?;
        let session = token.into_session(Utc::now());
        *self.session.write().await = Some(session.clone());
        info!(user = %session.user.id, "signed in");
        let _ = self.events.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, profile: &SignUpProfile) -> Result<()> {
        let builder = self
            .request(Method::POST, "auth/v1/signup", &self.anon_key)?
            .json(&json!({
                "email": email,
                "password": password,
                "data": {
                    "display_name": profile.display_name,
                    "phone": profile.phone,
                    "location": profile.region,
                    "role": profile.role.tag(),
                }
            }));
        self.send(builder, "sign up").await?;
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        let previous = self.session.write().await.take();
        let result = match previous {
            Some(session) => {
                let builder =
                    self.request(Method::POST, "auth/v1/logout", &session.access_token)?;
                self.send(builder, "sign out").await.map(|_| ())
            }
            None => Ok(()),
        };
        let _ = self.events.send(AuthEvent::SignedOut);
        result
    }

    async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
