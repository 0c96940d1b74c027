//! Pre-transition access check.
//!
//! The rules are evaluated in a fixed priority order and the first match
//! wins:
//!
//! 1. guest-only route while authenticated → dashboard
//! 2. authenticated route while anonymous → login
//! 3. admin route without the admin role → dashboard
//! 4. user route with the admin role → admin home
//!
//! Role checks use the cached identity record. They shape navigation only;
//! the service enforces roles on its own.

use super::routes::{RedirectTarget, RouteDescriptor};
use crate::auth::SessionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allowed,
    Redirect(RedirectTarget),
}

pub fn evaluate(route: &RouteDescriptor, session: &SessionSnapshot) -> GuardDecision {
    let requires = route.requirements();

    if requires.requires_guest && session.authenticated {
        GuardDecision::Redirect(RedirectTarget::Dashboard)
    } else if requires.requires_auth && !session.authenticated {
        GuardDecision::Redirect(RedirectTarget::Login)
    } else if requires.requires_admin && !session.is_admin {
        GuardDecision::Redirect(RedirectTarget::Dashboard)
    } else if requires.requires_user && session.is_admin {
        GuardDecision::Redirect(RedirectTarget::AdminHome)
    } else {
        GuardDecision::Allowed
    }
}
