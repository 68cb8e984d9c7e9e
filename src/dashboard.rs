//! Role dashboards and the browse catalogue.
//!
//! Every operation follows the same error policy: a failed backend call is
//! logged, surfaced as an error notification, and returned to the caller.
//! Mutations refetch the collection they touched.
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::backend::{Backend, ListingQuery};
use crate::filter::ListingFilter;
use crate::model::{
    unread_count, BookingRecord, Listing, ListingCategory, ListingStatus, NewListing,
    Notification, UserView,
};
use crate::notify::Notifier;
use crate::router::{authorize, View};

/// Log and surface a failed backend call, then hand the error back.
fn report(notifier: &Notifier, action: &str, err: anyhow::Error) -> anyhow::Error {
    error!(?err, action, "backend call failed");
    notifier.error(format!("Failed to {}: {:#}", action, err));
    err
}

fn guard(view: View, user: Option<&UserView>, notifier: &Notifier) -> Result<()> {
    authorize(view, user).map_err(|err| {
        notifier.error(err.to_string());
        anyhow!(err)
    })
}

/// Available listings plus the browse selectors applied to them.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    pub listings: Vec<Listing>,
}

impl Catalogue {
    pub async fn load(backend: &dyn Backend, notifier: &Notifier) -> Result<Self> {
        let listings = backend
            .list_listings(&ListingQuery::with_status(ListingStatus::Available))
            .await
            .map_err(|err| report(notifier, "load equipment", err))?;
        Ok(Self { listings })
    }

    pub fn search<'a>(&'a self, filter: &'a ListingFilter) -> Vec<&'a Listing> {
        filter.apply(&self.listings).collect()
    }

    pub fn summary(&self, shown: usize) -> String {
        format!("Showing {} of {} equipment", shown, self.listings.len())
    }

    pub fn find(&self, id: Uuid) -> Option<&Listing> {
        self.listings.iter().find(|l| l.id == id)
    }
}

pub struct AdminDashboard<'a> {
    backend: &'a dyn Backend,
    notifier: &'a Notifier,
    user: UserView,
    pub pending: Vec<Listing>,
    pub notifications: Vec<Notification>,
}

impl<'a> AdminDashboard<'a> {
    pub async fn open(
        backend: &'a dyn Backend,
        notifier: &'a Notifier,
        user: Option<&UserView>,
    ) -> Result<AdminDashboard<'a>> {
        guard(View::AdminDashboard, user, notifier)?;
        let user = user.cloned().ok_or_else(|| anyhow!("no signed-in user"))?;
        let mut dashboard = Self {
            backend,
            notifier,
            user,
            pending: Vec::new(),
            notifications: Vec::new(),
        };
        dashboard.refresh_pending().await?;
        dashboard.refresh_notifications().await?;
        Ok(dashboard)
    }

    /// Pending listings, newest first, each tagged with its owner's display name.
    #[instrument(skip_all)]
    pub async fn refresh_pending(&mut self) -> Result<()> {
        let mut listings = self
            .backend
            .list_listings(&ListingQuery::with_status(ListingStatus::Pending))
            .await
            .map_err(|err| report(self.notifier, "load pending equipment", err))?;

        let mut owner_ids: Vec<Uuid> = listings.iter().map(|l| l.owner_id).collect();
        owner_ids.sort();
        owner_ids.dedup();
        let profiles = self
            .backend
            .profiles_by_ids(&owner_ids)
            .await
            .map_err(|err| report(self.notifier, "load owner profiles", err))?;
        let names: HashMap<Uuid, String> = profiles
            .into_iter()
            .filter_map(|p| Some((p.id?, p.display_name?)))
            .collect();
        for listing in &mut listings {
            listing.owner_name = names.get(&listing.owner_id).cloned();
        }
        self.pending = listings;
        Ok(())
    }

    pub async fn refresh_notifications(&mut self) -> Result<()> {
        self.notifications = self
            .backend
            .list_notifications(self.user.id)
            .await
            .map_err(|err| report(self.notifier, "load notifications", err))?;
        Ok(())
    }

    pub fn unread_count(&self) -> usize {
        unread_count(&self.notifications)
    }

    #[instrument(skip(self))]
    pub async fn approve(&mut self, listing_id: Uuid) -> Result<()> {
        self.backend
            .update_listing_status(listing_id, ListingStatus::Available)
            .await
            .map_err(|err| report(self.notifier, "approve equipment", err))?;
        info!(%listing_id, "listing approved");
        self.notifier.success("Equipment approved successfully");
        self.refresh_pending().await
    }

    #[instrument(skip(self))]
    pub async fn reject(&mut self, listing_id: Uuid) -> Result<()> {
        self.backend
            .delete_listing(listing_id)
            .await
            .map_err(|err| report(self.notifier, "reject equipment", err))?;
        info!(%listing_id, "listing rejected");
        self.notifier.success("Equipment has been removed");
        self.refresh_pending().await
    }

    pub async fn mark_read(&mut self, notification_id: Uuid) -> Result<()> {
        self.backend
            .mark_notification_read(notification_id)
            .await
            .map_err(|err| report(self.notifier, "mark notification as read", err))?;
        self.refresh_notifications().await
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListingFormError {
    #[error("Please fill in all required fields")]
    MissingFields(Vec<&'static str>),
    #[error("Unknown equipment category '{0}'")]
    UnknownCategory(String),
    #[error("Daily rate must be a non-negative number")]
    InvalidRate,
}

/// Owner's "add equipment" form as entered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingForm {
    pub name: String,
    pub category: String,
    pub description: String,
    pub daily_rate: String,
    pub region: String,
    pub image_url: String,
}

impl ListingForm {
    pub fn validate(&self) -> Result<NewListing, ListingFormError> {
        let missing: Vec<&'static str> = [
            ("name", &self.name),
            ("category", &self.category),
            ("daily rate", &self.daily_rate),
            ("location", &self.region),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(field, _)| field)
        .collect();
        if !missing.is_empty() {
            return Err(ListingFormError::MissingFields(missing));
        }
        let category = ListingCategory::parse(&self.category)
            .ok_or_else(|| ListingFormError::UnknownCategory(self.category.trim().to_string()))?;
        let daily_rate = self
            .daily_rate
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|r| r.is_finite() && *r >= 0.0)
            .ok_or(ListingFormError::InvalidRate)?;
        let optional = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
        Ok(NewListing {
            name: self.name.trim().to_string(),
            category,
            description: optional(&self.description),
            daily_rate,
            region: self.region.trim().to_string(),
            image_url: optional(&self.image_url),
        })
    }
}

pub struct OwnerDashboard<'a> {
    backend: &'a dyn Backend,
    notifier: &'a Notifier,
    user: UserView,
    pub listings: Vec<Listing>,
}

impl<'a> OwnerDashboard<'a> {
    pub async fn open(
        backend: &'a dyn Backend,
        notifier: &'a Notifier,
        user: Option<&UserView>,
    ) -> Result<OwnerDashboard<'a>> {
        guard(View::MachineOwnerDashboard, user, notifier)?;
        let user = user.cloned().ok_or_else(|| anyhow!("no signed-in user"))?;
        let mut dashboard = Self {
            backend,
            notifier,
            user,
            listings: Vec::new(),
        };
        dashboard.refresh().await?;
        Ok(dashboard)
    }

    pub async fn refresh(&mut self) -> Result<()> {
        self.listings = self
            .backend
            .list_listings(&ListingQuery::owned_by(self.user.id))
            .await
            .map_err(|err| report(self.notifier, "load your equipment", err))?;
        Ok(())
    }

    /// Listings of this owner in the given status.
    pub fn count_by_status(&self, status: ListingStatus) -> usize {
        self.listings.iter().filter(|l| l.status == status).count()
    }

    #[instrument(skip_all)]
    pub async fn add_listing(&mut self, form: &ListingForm) -> Result<Listing> {
        let fields = form.validate().map_err(|err| {
            self.notifier.error(err.to_string());
            anyhow!(err)
        })?;
        let created = self
            .backend
            .insert_listing(self.user.id, &fields)
            .await
            .map_err(|err| report(self.notifier, "add equipment", err))?;
        self.notifier
            .success("Equipment added and submitted for admin approval");
        self.refresh().await?;
        Ok(created)
    }
}

/// A farmer's rentals, split at `today` into active and past bookings.
pub struct FarmerDashboard<'a> {
    backend: &'a dyn Backend,
    notifier: &'a Notifier,
    user: UserView,
    today: NaiveDate,
    pub active: Vec<BookingRecord>,
    pub history: Vec<BookingRecord>,
}

impl<'a> FarmerDashboard<'a> {
    pub async fn open(
        backend: &'a dyn Backend,
        notifier: &'a Notifier,
        user: Option<&UserView>,
        today: NaiveDate,
    ) -> Result<FarmerDashboard<'a>> {
        guard(View::FarmerDashboard, user, notifier)?;
        let user = user.cloned().ok_or_else(|| anyhow!("no signed-in user"))?;
        let mut dashboard = Self {
            backend,
            notifier,
            user,
            today,
            active: Vec::new(),
            history: Vec::new(),
        };
        dashboard.refresh().await?;
        Ok(dashboard)
    }

    #[instrument(skip_all)]
    pub async fn refresh(&mut self) -> Result<()> {
        let bookings = self
            .backend
            .list_bookings(self.user.id)
            .await
            .map_err(|err| report(self.notifier, "load your bookings", err))?;
        let today = self.today;
        let (active, history): (Vec<_>, Vec<_>) =
            bookings.into_iter().partition(|b| b.is_active(today));
        self.active = active;
        self.history = history;
        Ok(())
    }

    /// Rental value of every booking that was not cancelled.
    pub fn total_spent(&self) -> f64 {
        self.active
            .iter()
            .chain(&self.history)
            .filter(|b| !b.is_cancelled())
            .map(|b| b.total_amount)
            .sum()
    }

    /// Past rentals that ran to the end.
    pub fn completed_count(&self) -> usize {
        self.history.iter().filter(|b| !b.is_cancelled()).count()
    }
}
