//! Sign-in sessions and role-gated access.
//!
//! A [`Session`] is created by [`login`], persisted through a
//! [`SessionStore`], handed explicitly to the [`ApiClient`], and destroyed by
//! [`logout`]. Nothing reads ambient global state.

use std::fmt;

use serde::Deserialize;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::api::ApiClient;
use crate::error::{DeskError, Result};
use crate::models::Role;
use crate::storage::SessionStore;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An authenticated session. The token is wiped from memory on drop.
#[derive(Clone)]
pub struct Session {
    token: Zeroizing<String>,
    role: Role,
}

impl Session {
    pub fn new(token: impl Into<String>, role: Role) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
            role,
        }
    }

    pub(crate) fn from_parts(token: String, role: &str) -> Result<Self> {
        let role = role.parse::<Role>().map_err(DeskError::Decode)?;
        if token.trim().is_empty() {
            return Err(DeskError::Decode("empty session token".into()));
        }
        Ok(Self::new(token, role))
    }

    pub fn token(&self) -> &str {
        self.token.as_str()
    }

    /// False for a blank token, which must never reach a request header.
    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Landing page after sign-in.
    pub fn home_route(&self) -> Route {
        match self.role {
            Role::Admin => Route::AdminDashboard,
            Role::Teacher => Route::TeacherDashboard,
            Role::Student => Route::StudentDashboard,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

pub struct Credentials {
    pub email: String,
    pub password: Zeroizing<String>,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() {
            return Err(DeskError::validation("Email is required"));
        }
        if self.password.is_empty() {
            return Err(DeskError::validation("Password is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub role: String,
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Exchange credentials for a session and persist it.
pub async fn login(
    api: &ApiClient,
    store: &dyn SessionStore,
    credentials: &Credentials,
) -> Result<Session> {
    credentials.validate()?;
    let response = api.login(credentials).await?;
    let session = Session::from_parts(response.token, &response.role)?;
    store.save(&session)?;
    info!(role = %session.role(), "signed in");
    Ok(session)
}

/// Forget the session. The token is zeroized when `session` drops here.
pub fn logout(store: &dyn SessionStore, session: Session) -> Result<()> {
    let role = session.role();
    drop(session);
    if let Err(e) = store.clear() {
        warn!(error = %e, "failed to clear stored session");
        return Err(e);
    }
    info!(role = %role, "signed out");
    Ok(())
}

// ---------------------------------------------------------------------------
// Route gating
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Login,
    AdminDashboard,
    StudentsManagement,
    TeachersManagement,
    Events,
    AdminAttendance,
    Settings,
    AdminMarksEntry,
    AdminFeesEntry,
    TeacherDashboard,
    TeacherStudents,
    TeacherAttendance,
    TeacherMarksEntry,
    TeacherSettings,
    TeacherFeesEntry,
    StudentDashboard,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
            Route::AdminDashboard => "/admin",
            Route::StudentsManagement => "/admin/studentsmanagement",
            Route::TeachersManagement => "/admin/teachersmanagement",
            Route::Events => "/admin/events",
            Route::AdminAttendance => "/admin/attendance",
            Route::Settings => "/admin/settings",
            Route::AdminMarksEntry => "/admin/marks-entry",
            Route::AdminFeesEntry => "/admin/fees-entry",
            Route::TeacherDashboard => "/teacher-dashboard",
            Route::TeacherStudents => "/teacher/studentsmanagement",
            Route::TeacherAttendance => "/teacher/attendance",
            Route::TeacherMarksEntry => "/teacher/marks-entry",
            Route::TeacherSettings => "/teacher/settings",
            Route::TeacherFeesEntry => "/teacher/fees-entry",
            Route::StudentDashboard => "/student-dashboard",
        }
    }

    /// Roles allowed to open this route; `None` means public.
    pub fn allowed_roles(self) -> Option<&'static [Role]> {
        match self {
            Route::Home | Route::Login => None,
            Route::AdminDashboard
            | Route::StudentsManagement
            | Route::TeachersManagement
            | Route::Events
            | Route::AdminAttendance
            | Route::Settings
            | Route::AdminMarksEntry
            | Route::AdminFeesEntry => Some(&[Role::Admin]),
            Route::TeacherDashboard
            | Route::TeacherStudents
            | Route::TeacherAttendance
            | Route::TeacherMarksEntry
            | Route::TeacherSettings
            | Route::TeacherFeesEntry => Some(&[Role::Teacher]),
            Route::StudentDashboard => Some(&[Role::Student]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    Redirect(Route),
}

/// Decide whether `session` may render `route`.
pub fn authorize(route: Route, session: Option<&Session>) -> Access {
    let Some(allowed) = route.allowed_roles() else {
        return Access::Granted;
    };
    match session {
        None => Access::Redirect(Route::Login),
        Some(s) if allowed.contains(&s.role()) => Access::Granted,
        Some(s) => Access::Redirect(s.home_route()),
    }
}

/// First route in `candidates` the session can open, else an error naming
/// where the operator would be sent instead.
pub fn require_any(session: Option<&Session>, candidates: &[Route]) -> Result<Route> {
    let mut redirect = Route::Login;
    for route in candidates {
        match authorize(*route, session) {
            Access::Granted => return Ok(*route),
            Access::Redirect(target) => redirect = target,
        }
    }
    if session.is_none() {
        return Err(DeskError::Unauthenticated);
    }
    Err(DeskError::Forbidden(format!(
        "This page is not available for your role (redirected to {})",
        redirect.path()
    )))
}
