//! Application state: the single owner of the current user and current view.
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{info, instrument, warn};

use crate::backend::Backend;
use crate::booking::{BookingDenied, BookingFlow};
use crate::model::{AuthEvent, Listing, Role, SignUpProfile, UserView};
use crate::notify::Notifier;
use crate::router::{self, Route, View};
use crate::session::{Resolution, SessionResolver};

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    user: Option<UserView>,
    view: View,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            user: None,
            view: View::Home,
        }
    }
}

impl AppState {
    pub fn user(&self) -> Option<&UserView> {
        self.user.as_ref()
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn navigate(&mut self, token: &str) -> Route {
        self.view = View::from_token(token);
        self.render()
    }

    pub fn render(&self) -> Route {
        router::route(self.view.token(), self.user.as_ref())
    }

    /// Replace the current user; a new user lands on their dashboard, no user lands home.
    pub fn set_user(&mut self, user: Option<UserView>) {
        self.view = match &user {
            Some(u) => View::dashboard_for(u.role),
            None => View::Home,
        };
        self.user = user;
    }
}

/// Sign-up input as entered on the registration form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: String,
    pub region: String,
    pub role: Option<Role>,
}

impl SignUpForm {
    fn profile(&self) -> Result<SignUpProfile> {
        if self.email.trim().is_empty()
            || self.password.is_empty()
            || self.name.trim().is_empty()
        {
            return Err(anyhow!("Please fill in all required fields."));
        }
        let optional = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
        // Admin is never self-assigned.
        let role = match self.role {
            Some(Role::Owner) => Role::Owner,
            Some(Role::Farmer) | None => Role::Farmer,
            Some(Role::Admin) | Some(Role::User) => Role::User,
        };
        Ok(SignUpProfile {
            display_name: self.name.trim().to_string(),
            phone: optional(&self.phone),
            region: optional(&self.region),
            role,
        })
    }
}

/// Owns the app state. The user is only ever changed by auth events coming
/// from the backend's stream, in delivery order.
pub struct App {
    backend: Arc<dyn Backend>,
    notifier: Notifier,
    resolver: SessionResolver,
    events: broadcast::Receiver<AuthEvent>,
    state: AppState,
}

impl App {
    pub fn new(backend: Arc<dyn Backend>, notifier: Notifier) -> Self {
        let resolver = SessionResolver::new(backend.clone());
        let events = backend.subscribe();
        Self {
            backend,
            notifier,
            resolver,
            events,
            state: AppState::default(),
        }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AppState {
        &mut self.state
    }

    /// Apply every auth event delivered so far. Returns the outcome of the
    /// last one, since it decides who is signed in.
    pub async fn sync_auth(&mut self) -> Result<()> {
        let mut outcome = Ok(());
        loop {
            match self.events.try_recv() {
                Ok(event) => outcome = self.apply_auth_event(&event).await,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth events lagged; continuing with the newest");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        outcome
    }

    #[instrument(skip_all)]
    async fn apply_auth_event(&mut self, event: &AuthEvent) -> Result<()> {
        match self.resolver.handle(event).await {
            Ok(Resolution::Applied(user)) => {
                let greeting = match (&user, event) {
                    (Some(u), AuthEvent::SignedIn(_)) => Some(format!("Welcome, {}!", u.name)),
                    _ => None,
                };
                self.state.set_user(user);
                if let Some(greeting) = greeting {
                    self.notifier.success(greeting);
                }
                Ok(())
            }
            Ok(Resolution::Superseded) => Ok(()),
            Err(err) => {
                warn!(?err, "failed to load user account");
                self.state.set_user(self.resolver.current_user().await);
                self.notifier
                    .error(format!("Could not load your account: {:#}", err));
                Err(err)
            }
        }
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<()> {
        if let Err(err) = self.backend.sign_in(email.trim(), password).await {
            warn!(?err, "sign-in failed");
            self.notifier.error(format!("{:#}", err));
            return Err(err);
        }
        self.sync_auth().await
    }

    pub async fn sign_up(&mut self, form: &SignUpForm) -> Result<()> {
        let profile = form.profile().map_err(|err| {
            self.notifier.error(err.to_string());
            err
        })?;
        if let Err(err) = self
            .backend
            .sign_up(form.email.trim(), &form.password, &profile)
            .await
        {
            warn!(?err, "sign-up failed");
            self.notifier.error(format!("{:#}", err));
            return Err(err);
        }
        info!(role = %profile.role, "sign-up submitted");
        self.notifier
            .success("Confirmation email sent. Please check your inbox.");
        self.state.navigate(View::Login.token());
        Ok(())
    }

    /// Start booking a listing as the current user. Guests are sent to login.
    pub fn open_booking(&mut self, listing: Listing) -> Result<BookingFlow, BookingDenied> {
        let result = BookingFlow::open(listing, self.state.user.clone(), &self.notifier);
        if let Err(BookingDenied::NotSignedIn) = &result {
            self.state.navigate(View::Login.token());
        }
        result
    }

    pub async fn sign_out(&mut self) -> Result<()> {
        let result = self.backend.sign_out().await;
        if let Err(err) = &result {
            warn!(?err, "sign-out request failed; local session is cleared anyway");
        }
        self.sync_auth().await?;
        result
    }
}
