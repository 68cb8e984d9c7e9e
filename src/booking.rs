//! Booking submission: validation, pricing, persistence and confirmation.
use chrono::{NaiveDate, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::backend::Backend;
use crate::model::{BookingRecord, Listing, PaymentOption, Role, UserView};
use crate::notify::Notifier;
use crate::pricing::{parse_duration_strict, Quote};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please fill all required fields")]
    MissingContact(Vec<&'static str>),
    #[error("Please select booking dates and duration")]
    MissingSchedule,
    #[error("End date must be after the start date")]
    EndNotAfterStart,
    #[error("Duration must be a whole number of days")]
    InvalidDuration,
    #[error("Duration of {given} days does not match the {expected} days between the selected dates")]
    DurationMismatch { given: u32, expected: i64 },
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("a booking can only be submitted while editing")]
    NotEditing,
    #[error("booking could not be saved: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Why a booking form cannot be opened for a listing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BookingDenied {
    #[error("Please login to book equipment")]
    NotSignedIn,
    #[error("Admins cannot book equipment directly")]
    Admin,
}

/// Raw form input as the customer entered it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingForm {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub farm_size: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub duration: String,
    pub purpose: Option<String>,
    pub special_requirements: Option<String>,
    pub payment_option: PaymentOption,
}

impl BookingForm {
    /// Empty form pre-filled with the customer's name, email and phone.
    pub fn for_user(user: Option<&UserView>) -> Self {
        Self {
            full_name: user.map(|u| u.name.clone()).unwrap_or_default(),
            email: user.and_then(|u| u.email.clone()).unwrap_or_default(),
            phone: user.and_then(|u| u.phone.clone()).unwrap_or_default(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(NaiveDate, NaiveDate), ValidationError> {
        let missing: Vec<&'static str> = [
            ("full name", &self.full_name),
            ("email", &self.email),
            ("phone", &self.phone),
            ("address", &self.address),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingContact(missing));
        }

        let (Some(start), Some(end)) = (self.start_date, self.end_date) else {
            return Err(ValidationError::MissingSchedule);
        };
        if self.duration.trim().is_empty() {
            return Err(ValidationError::MissingSchedule);
        }
        // The end date is the return day, so a rental spans `end - start` days.
        if end <= start {
            return Err(ValidationError::EndNotAfterStart);
        }
        let given = parse_duration_strict(&self.duration).ok_or(ValidationError::InvalidDuration)?;
        let expected = (end - start).num_days();
        if i64::from(given) != expected {
            return Err(ValidationError::DurationMismatch { given, expected });
        }
        Ok((start, end))
    }

    pub fn quote(&self, daily_rate: f64) -> Quote {
        Quote::from_input(daily_rate, &self.duration, self.payment_option)
    }
}

/// Session-unique, time-based booking identifiers (`BK<millis>`).
#[derive(Debug, Default)]
pub struct BookingIds {
    last: AtomicI64,
}

impl BookingIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self
                .last
                .compare_exchange(prev, candidate, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return format!("BK{}", candidate),
                Err(actual) => prev = actual,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingConfirmation {
    pub booking_id: String,
    pub quote: Quote,
    pub record: BookingRecord,
}

/// Ordered messages produced by one completed booking: the customer's
/// confirmation first, then the owner and admin notices.
pub fn completion_messages(confirmation: &BookingConfirmation, owner: &str) -> [String; 3] {
    [
        format!("Booking confirmed! Booking ID: {}", confirmation.booking_id),
        format!("Notification sent to {}", owner),
        "Admin has been notified of the new booking".to_string(),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub enum BookingState {
    Editing,
    Processing,
    Completed(BookingConfirmation),
}

/// One booking form for one listing: `Editing -> Processing -> Completed`.
#[derive(Debug)]
pub struct BookingFlow {
    listing: Listing,
    customer: Option<UserView>,
    pub form: BookingForm,
    state: BookingState,
}

impl BookingFlow {
    /// Open a booking form. Absent users must log in first and admins cannot book.
    pub fn open(
        listing: Listing,
        customer: Option<UserView>,
        notifier: &Notifier,
    ) -> Result<Self, BookingDenied> {
        match customer.as_ref().map(|c| c.role) {
            None => {
                notifier.error(BookingDenied::NotSignedIn.to_string());
                return Err(BookingDenied::NotSignedIn);
            }
            Some(Role::Admin) => {
                notifier.info(BookingDenied::Admin.to_string());
                return Err(BookingDenied::Admin);
            }
            Some(_) => {}
        }
        let form = BookingForm::for_user(customer.as_ref());
        Ok(Self {
            listing,
            customer,
            form,
            state: BookingState::Editing,
        })
    }

    pub fn state(&self) -> &BookingState {
        &self.state
    }

    pub fn listing(&self) -> &Listing {
        &self.listing
    }

    /// Live quote for the current form contents.
    pub fn quote(&self) -> Quote {
        self.form.quote(self.listing.daily_rate)
    }

    /// Validate, price, persist, then announce. `on_complete` runs after all
    /// notifications have been emitted.
    #[instrument(skip_all, fields(listing = %self.listing.id))]
    pub async fn submit<F>(
        &mut self,
        backend: &dyn Backend,
        notifier: &Notifier,
        ids: &BookingIds,
        on_complete: F,
    ) -> Result<BookingConfirmation, BookingError>
    where
        F: FnOnce(&BookingConfirmation),
    {
        if self.state != BookingState::Editing {
            return Err(BookingError::NotEditing);
        }
        let (start_date, end_date) = match self.form.validate() {
            Ok(dates) => dates,
            Err(err) => {
                notifier.error(err.to_string());
                return Err(err.into());
            }
        };

        self.state = BookingState::Processing;
        let quote = self.quote();
        let booking_id = ids.next_id();
        let record = self.record(&booking_id, &quote, start_date, end_date);

        if let Err(err) = backend.insert_booking(&record).await {
            error!(?err, %booking_id, "failed to create booking");
            self.state = BookingState::Editing;
            notifier.error(format!("Booking failed: {:#}", err));
            return Err(BookingError::Backend(err));
        }

        let confirmation = BookingConfirmation {
            booking_id,
            quote,
            record,
        };
        info!(
            booking_id = %confirmation.booking_id,
            payable = confirmation.quote.payable_amount,
            "booking confirmed"
        );
        self.state = BookingState::Completed(confirmation.clone());

        let [confirmed, owner_notice, admin_notice] =
            completion_messages(&confirmation, self.listing.owner_label());
        notifier.success(confirmed);
        notifier.info(owner_notice);
        notifier.info(admin_notice);

        on_complete(&confirmation);
        Ok(confirmation)
    }

    fn record(
        &self,
        booking_id: &str,
        quote: &Quote,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> BookingRecord {
        let optional = |v: &Option<String>| v.as_ref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        BookingRecord {
            booking_id: booking_id.to_string(),
            listing_id: self.listing.id,
            owner_id: self.listing.owner_id,
            customer_id: self.customer.as_ref().map(|c| c.id),
            full_name: self.form.full_name.trim().to_string(),
            email: self.form.email.trim().to_string(),
            phone: self.form.phone.trim().to_string(),
            address: self.form.address.trim().to_string(),
            farm_size: optional(&self.form.farm_size),
            purpose: optional(&self.form.purpose),
            special_requirements: optional(&self.form.special_requirements),
            start_date,
            end_date,
            duration_days: quote.duration_days,
            payment_option: quote.payment_option,
            total_amount: quote.total_amount,
            payable_amount: quote.payable_amount,
            status: BookingRecord::CONFIRMED.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_form() -> BookingForm {
        BookingForm {
            full_name: "Sarah Wilson".into(),
            email: "sarah@farm.io".into(),
            phone: "+1234567892".into(),
            address: "12 Valley Rd".into(),
            start_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 6),
            duration: "5".into(),
            ..Default::default()
        }
    }

    #[test]
    fn complete_form_validates() {
        assert!(complete_form().validate().is_ok());
    }

    #[test]
    fn empty_phone_is_reported() {
        let mut form = complete_form();
        form.phone = "   ".into();
        let err = form.validate().unwrap_err();
        assert_eq!(err, ValidationError::MissingContact(vec!["phone"]));
        assert_eq!(err.to_string(), "Please fill all required fields");
    }

    #[test]
    fn missing_dates_or_duration() {
        let mut form = complete_form();
        form.end_date = None;
        assert_eq!(form.validate(), Err(ValidationError::MissingSchedule));
        let mut form = complete_form();
        form.duration.clear();
        assert_eq!(form.validate(), Err(ValidationError::MissingSchedule));
    }

    #[test]
    fn dates_must_be_ordered_and_consistent() {
        let mut form = complete_form();
        form.end_date = NaiveDate::from_ymd_opt(2025, 2, 27);
        assert_eq!(form.validate(), Err(ValidationError::EndNotAfterStart));

        let mut form = complete_form();
        form.duration = "3".into();
        assert_eq!(
            form.validate(),
            Err(ValidationError::DurationMismatch {
                given: 3,
                expected: 5
            })
        );
    }

    #[test]
    fn same_day_return_is_rejected_whatever_the_duration() {
        for duration in ["0", "1", "one"] {
            let mut form = complete_form();
            form.end_date = form.start_date;
            form.duration = duration.into();
            assert_eq!(form.validate(), Err(ValidationError::EndNotAfterStart));
        }
    }

    #[test]
    fn one_day_rental_returns_next_day() {
        let mut form = complete_form();
        form.end_date = NaiveDate::from_ymd_opt(2025, 3, 2);
        form.duration = "1".into();
        assert!(form.validate().is_ok());
        assert_eq!(form.quote(450.0).total_amount, 450.0);
    }

    #[test]
    fn unparseable_duration_is_rejected_but_quotes_one_day() {
        for duration in ["a week", "one", "-5", "2.5"] {
            let mut form = complete_form();
            form.duration = duration.into();
            assert_eq!(form.validate(), Err(ValidationError::InvalidDuration));
            assert_eq!(form.quote(450.0).total_amount, 450.0);
        }
    }

    #[test]
    fn booking_ids_strictly_increase() {
        let ids = BookingIds::new();
        let mut last = 0i64;
        for _ in 0..1000 {
            let id = ids.next_id();
            let n: i64 = id.strip_prefix("BK").unwrap().parse().unwrap();
            assert!(n > last);
            last = n;
        }
    }
}
