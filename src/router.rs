//! Maps a view token and the current user to what should be shown.
use crate::model::{Role, UserView};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Home,
    Login,
    Browse,
    FarmerDashboard,
    MachineOwnerDashboard,
    AdminDashboard,
}

impl View {
    /// Parse a view token; anything unrecognised is the home view.
    pub fn from_token(token: &str) -> Self {
        match token.trim() {
            "login" => View::Login,
            "browse" => View::Browse,
            "farmer-dashboard" => View::FarmerDashboard,
            "machine-owner-dashboard" => View::MachineOwnerDashboard,
            "admin-dashboard" => View::AdminDashboard,
            _ => View::Home,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            View::Home => "home",
            View::Login => "login",
            View::Browse => "browse",
            View::FarmerDashboard => "farmer-dashboard",
            View::MachineOwnerDashboard => "machine-owner-dashboard",
            View::AdminDashboard => "admin-dashboard",
        }
    }

    /// Role a user must hold to see this view, if any.
    pub fn required_role(&self) -> Option<Role> {
        match self {
            View::FarmerDashboard => Some(Role::Farmer),
            View::MachineOwnerDashboard => Some(Role::Owner),
            View::AdminDashboard => Some(Role::Admin),
            View::Home | View::Login | View::Browse => None,
        }
    }

    /// Landing view after sign-in.
    pub fn dashboard_for(role: Role) -> Self {
        match role {
            Role::Admin => View::AdminDashboard,
            Role::Owner => View::MachineOwnerDashboard,
            Role::Farmer => View::FarmerDashboard,
            Role::User => View::Home,
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Outcome of routing.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Render the view, with the user (if any) it is rendered for.
    Render { view: View, user: Option<UserView> },
    /// The view needs a signed-in user.
    RedirectToLogin { requested: View },
    /// The signed-in user lacks the view's role.
    Forbidden { requested: View, role: Role },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("please log in to open the {0} view")]
    NotSignedIn(View),
    #[error("{role} accounts cannot open the {view} view")]
    WrongRole { view: View, role: Role },
}

/// Check that `user` may open `view`.
pub fn authorize(view: View, user: Option<&UserView>) -> Result<(), AccessError> {
    let Some(required) = view.required_role() else {
        return Ok(());
    };
    match user {
        None => Err(AccessError::NotSignedIn(view)),
        Some(u) if u.role == required => Ok(()),
        Some(u) => Err(AccessError::WrongRole { view, role: u.role }),
    }
}

/// Route a token for the given user.
pub fn route(token: &str, user: Option<&UserView>) -> Route {
    let view = View::from_token(token);
    match authorize(view, user) {
        Ok(()) => Route::Render {
            view,
            user: user.cloned(),
        },
        Err(AccessError::NotSignedIn(requested)) => Route::RedirectToLogin { requested },
        Err(AccessError::WrongRole { view, role }) => Route::Forbidden {
            requested: view,
            role,
        },
    }
}
