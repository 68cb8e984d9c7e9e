//! Turns auth-state changes into the current [`UserView`].
//!
//! Each event takes a ticket from a monotonic generation counter. A resolution
//! only lands if its ticket is still the newest one when the fetches finish, so
//! a slow lookup for an old session can never overwrite a newer user.
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::model::{AuthEvent, Identity, Profile, Role, Session, UserView};

/// Rank per role; lower wins.
const ROLE_PRIORITY: [(Role, u8); 4] = [
    (Role::Admin, 0),
    (Role::Owner, 1),
    (Role::Farmer, 2),
    (Role::User, 3),
];

pub fn role_rank(role: Role) -> u8 {
    ROLE_PRIORITY
        .iter()
        .find(|(r, _)| *r == role)
        .map(|(_, rank)| *rank)
        .unwrap_or(u8::MAX)
}

/// Highest-priority role among `roles`; `User` when there are none.
pub fn resolve_role<I>(roles: I) -> Role
where
    I: IntoIterator<Item = Role>,
{
    roles
        .into_iter()
        .min_by_key(|r| role_rank(*r))
        .unwrap_or(Role::User)
}

/// Parse raw role tags, dropping any the client does not know.
pub fn parse_role_tags(tags: &[String]) -> Vec<Role> {
    tags.iter()
        .filter_map(|tag| {
            let role = Role::from_tag(tag);
            if role.is_none() {
                warn!(tag = %tag, "ignoring unknown role tag");
            }
            role
        })
        .collect()
}

/// Display name from the profile, else the email's local part, else "User".
pub fn display_name(profile: Option<&Profile>, email: Option<&str>) -> String {
    profile
        .and_then(|p| p.display_name.as_deref())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .or_else(|| {
            email
                .and_then(|e| e.split('@').next())
                .filter(|local| !local.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "User".to_string())
}

pub fn build_user_view(identity: &Identity, role_tags: &[String], profile: Option<Profile>) -> UserView {
    let role = resolve_role(parse_role_tags(role_tags));
    let name = display_name(profile.as_ref(), identity.email.as_deref());
    let (phone, region) = match profile {
        Some(p) => (p.phone, p.region),
        None => (None, None),
    };
    UserView {
        id: identity.id,
        name,
        email: identity.email.clone(),
        role,
        phone,
        region,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    user_id: Option<Uuid>,
}

#[derive(Debug, Default)]
struct ResolverState {
    generation: u64,
    user: Option<UserView>,
}

/// What happened to one auth event.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The user view was replaced with this value.
    Applied(Option<UserView>),
    /// A newer event arrived first; the result was dropped.
    Superseded,
}

pub struct SessionResolver {
    backend: Arc<dyn Backend>,
    state: Mutex<ResolverState>,
}

impl SessionResolver {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            state: Mutex::new(ResolverState::default()),
        }
    }

    pub async fn current_user(&self) -> Option<UserView> {
        self.state.lock().await.user.clone()
    }

    async fn issue_ticket(&self, session: Option<&Session>) -> Ticket {
        let mut state = self.state.lock().await;
        state.generation += 1;
        Ticket {
            generation: state.generation,
            user_id: session.map(|s| s.user.id),
        }
    }

    async fn commit(&self, ticket: Ticket, user: Option<UserView>) -> Resolution {
        let mut state = self.state.lock().await;
        if state.generation != ticket.generation {
            debug!(
                ticket = ticket.generation,
                current = state.generation,
                user_id = ?ticket.user_id,
                "discarding superseded session resolution"
            );
            return Resolution::Superseded;
        }
        state.user = user.clone();
        Resolution::Applied(user)
    }

    /// Resolve one auth event.
    ///
    /// A failed identity lookup clears the user and returns the error. Failed
    /// role or profile lookups degrade to a plain `User` with the email-derived
    /// name, matching what the backend would report for a bare account.
    #[instrument(skip_all)]
    pub async fn handle(&self, event: &AuthEvent) -> Result<Resolution> {
        let session = event.session();
        let ticket = self.issue_ticket(session).await;
        let Some(session) = session else {
            return Ok(self.commit(ticket, None).await);
        };

        let identity = match self.backend.current_identity(session).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                warn!(user_id = %session.user.id, "session has no identity; clearing user");
                return Ok(self.commit(ticket, None).await);
            }
            Err(err) => {
                // The previous user must not outlive the session change.
                self.commit(ticket, None).await;
                return Err(err);
            }
        };
        let (roles, profile) = futures::join!(
            self.backend.role_assignments(identity.id),
            self.backend.profile(identity.id)
        );
        let role_tags = roles.unwrap_or_else(|err| {
            warn!(?err, user_id = %identity.id, "role lookup failed; treating as plain user");
            Vec::new()
        });
        let profile = profile.unwrap_or_else(|err| {
            warn!(?err, user_id = %identity.id, "profile lookup failed");
            None
        });
        let user = build_user_view(&identity, &role_tags, profile);
        let resolution = self.commit(ticket, Some(user)).await;
        if let Resolution::Applied(Some(u)) = &resolution {
            info!(user_id = %u.id, role = %u.role, "resolved session user");
        }
        Ok(resolution)
    }
}
