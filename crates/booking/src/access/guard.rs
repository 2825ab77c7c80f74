use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;

use crate::access::routes::{self, paths};
use crate::user::UserRole;

/// The slice of a user profile the guard needs to make a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
}

/// Session state as seen by the guard. `Loading` means the session lookup is
/// still in flight and no decision should be committed yet.
#[derive(Debug, Clone)]
pub enum AuthSession {
    Loading,
    Unauthenticated,
    Authenticated(SessionUser),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Keep waiting; the session is not resolved yet.
    Loading,
    /// Serve the requested resource.
    Render,
    Redirect(&'static str),
}

/// Role-based access guard. Checks run in a fixed order; the first failing
/// check determines the outcome and later checks never execute:
///
/// 1. session still loading
/// 2. unauthenticated -> login
/// 3. admin required but email not allowlisted -> unauthorized
/// 4. route policy table denies the role on this path -> own dashboard
/// 5. explicit required role not matched -> own dashboard
#[derive(Debug, Clone)]
pub struct RoleGuard {
    admin_emails: Vec<String>,
}

impl RoleGuard {
    pub fn new(admin_emails: Vec<String>) -> Self {
        let admin_emails = admin_emails
            .into_iter()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { admin_emails }
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|e| *e == email)
    }

    /// Dashboard a user lands on when turned away from a route they cannot
    /// use. Anything that is not admin or business is treated as a client.
    pub fn dashboard_for(role: UserRole) -> &'static str {
        match role {
            UserRole::Admin => paths::ADMIN,
            UserRole::Business => paths::BUSINESS_DASHBOARD,
            UserRole::Client => paths::CLIENT_DASHBOARD,
        }
    }

    pub fn evaluate(
        &self,
        session: &AuthSession,
        required_role: Option<UserRole>,
        path: &str,
    ) -> GuardDecision {
        let user = match session {
            AuthSession::Loading => return GuardDecision::Loading,
            AuthSession::Unauthenticated => {
                tracing::warn!("[RoleGuard::evaluate] unauthenticated access to {}", path);
                return GuardDecision::Redirect(paths::LOGIN);
            }
            AuthSession::Authenticated(user) => user,
        };

        // The role flag alone is not enough for admin access; the email must
        // also be on the allowlist.
        if required_role == Some(UserRole::Admin) && !self.is_admin_email(&user.email) {
            tracing::warn!(
                "[RoleGuard::evaluate] admin required on {} but {} is not allowlisted",
                path,
                user.email
            );
            return GuardDecision::Redirect(paths::UNAUTHORIZED);
        }

        if !routes::has_route_access(user.role, path) {
            tracing::warn!(
                "[RoleGuard::evaluate] role {} denied on {}",
                user.role,
                path
            );
            return GuardDecision::Redirect(Self::dashboard_for(user.role));
        }

        if let Some(required) = required_role {
            if user.role != required {
                tracing::warn!(
                    "[RoleGuard::evaluate] {} requires {}, caller is {}",
                    path,
                    required,
                    user.role
                );
                return GuardDecision::Redirect(Self::dashboard_for(user.role));
            }
        }

        GuardDecision::Render
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> RoleGuard {
        RoleGuard::new(vec!["root@bizli.app".into()])
    }

    fn session(role: UserRole, email: &str) -> AuthSession {
        AuthSession::Authenticated(SessionUser {
            id: Uuid::new_v4(),
            email: email.into(),
            role,
        })
    }

    #[test]
    fn loading_short_circuits_everything() {
        let g = guard();
        assert_eq!(
            g.evaluate(&AuthSession::Loading, Some(UserRole::Admin), "/admin"),
            GuardDecision::Loading
        );
        assert_eq!(g.evaluate(&AuthSession::Loading, None, "/"), GuardDecision::Loading);
    }

    #[test]
    fn unauthenticated_redirects_to_login() {
        let g = guard();
        assert_eq!(
            g.evaluate(&AuthSession::Unauthenticated, Some(UserRole::Client), "/client/appointments"),
            GuardDecision::Redirect("/login")
        );
        assert_eq!(
            g.evaluate(&AuthSession::Unauthenticated, None, "/business"),
            GuardDecision::Redirect("/login")
        );
    }

    #[test]
    fn admin_email_allowlist_is_enforced() {
        let g = guard();
        // Role flag says admin, but the email is not on the allowlist.
        let forged = session(UserRole::Admin, "mallory@example.com");
        assert_eq!(
            g.evaluate(&forged, Some(UserRole::Admin), "/admin"),
            GuardDecision::Redirect("/unauthorized")
        );

        let real = session(UserRole::Admin, "Root@Bizli.app");
        assert_eq!(
            g.evaluate(&real, Some(UserRole::Admin), "/admin"),
            GuardDecision::Render
        );
    }

    #[test]
    fn allowlist_check_outranks_route_access() {
        let g = guard();
        // A client hitting an admin-required surface fails the email check
        // first and lands on /unauthorized, not their dashboard.
        let client = session(UserRole::Client, "jane@example.com");
        assert_eq!(
            g.evaluate(&client, Some(UserRole::Admin), "/admin"),
            GuardDecision::Redirect("/unauthorized")
        );
    }

    #[test]
    fn route_access_denial_goes_to_own_dashboard() {
        let g = guard();
        let business = session(UserRole::Business, "owner@shop.com");
        assert_eq!(
            g.evaluate(&business, Some(UserRole::Client), "/client/appointments"),
            GuardDecision::Redirect("/business-dashboard")
        );
        let client = session(UserRole::Client, "jane@example.com");
        assert_eq!(
            g.evaluate(&client, Some(UserRole::Business), "/business"),
            GuardDecision::Redirect("/client-dashboard")
        );
    }

    #[test]
    fn required_role_mismatch_redirects_even_on_open_paths() {
        let g = guard();
        // The path itself is public, but the caller does not hold the
        // explicitly required role.
        let client = session(UserRole::Client, "jane@example.com");
        assert_eq!(
            g.evaluate(&client, Some(UserRole::Business), "/"),
            GuardDecision::Redirect("/client-dashboard")
        );
    }

    #[test]
    fn matching_role_renders() {
        let g = guard();
        let client = session(UserRole::Client, "jane@example.com");
        assert_eq!(
            g.evaluate(&client, Some(UserRole::Client), "/client-dashboard"),
            GuardDecision::Render
        );
        assert_eq!(g.evaluate(&client, None, "/client/payments"), GuardDecision::Render);
        assert_eq!(g.evaluate(&client, None, "/"), GuardDecision::Render);
    }
}
