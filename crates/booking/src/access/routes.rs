use crate::user::UserRole;

/// Route path constants, grouped by audience. These are the single source of
/// truth shared by the HTTP routers and the policy table below.
pub mod paths {
    // PUBLIC
    pub const HOME: &str = "/";
    pub const LOGIN: &str = "/login";
    pub const REGISTER: &str = "/register";
    pub const UNAUTHORIZED: &str = "/unauthorized";

    // CLIENT
    pub const CLIENT_DASHBOARD: &str = "/client-dashboard";
    pub const CLIENT: &str = "/client";

    // BUSINESS
    pub const BUSINESS_DASHBOARD: &str = "/business-dashboard";
    pub const BUSINESS: &str = "/business";

    // ADMIN
    pub const ADMIN: &str = "/admin";
}

/// Prefix -> required roles. Matching is first-declared-wins, so the more
/// specific prefixes must stay ahead of the shorter ones they contain
/// ("/business-dashboard" before "/business"). Paths matching no entry are
/// implicitly public.
const ROUTE_POLICY: &[(&str, &[UserRole])] = &[
    (paths::ADMIN, &[UserRole::Admin]),
    (paths::BUSINESS_DASHBOARD, &[UserRole::Business]),
    (paths::BUSINESS, &[UserRole::Business]),
    (paths::CLIENT_DASHBOARD, &[UserRole::Client]),
    (paths::CLIENT, &[UserRole::Client]),
];

fn matching_entry(path: &str) -> Option<&'static (&'static str, &'static [UserRole])> {
    ROUTE_POLICY.iter().find(|(prefix, _)| path.starts_with(prefix))
}

pub fn is_protected_route(path: &str) -> bool {
    matching_entry(path).is_some()
}

/// Role set of the first matching policy entry; empty for public paths.
pub fn required_roles(path: &str) -> &'static [UserRole] {
    matching_entry(path).map(|(_, roles)| *roles).unwrap_or(&[])
}

pub fn has_route_access(role: UserRole, path: &str) -> bool {
    match matching_entry(path) {
        Some((_, roles)) => roles.contains(&role),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_paths_are_public() {
        assert!(!is_protected_route("/"));
        assert!(!is_protected_route("/login"));
        assert!(!is_protected_route("/stripe/webhook/payments"));
        assert!(required_roles("/login").is_empty());
        for role in [UserRole::Client, UserRole::Business, UserRole::Admin] {
            assert!(has_route_access(role, "/login"));
        }
    }

    #[test]
    fn prefixes_cover_nested_paths() {
        assert!(is_protected_route("/admin/businesses"));
        assert!(is_protected_route("/client/appointments"));
        assert!(is_protected_route("/business/services"));
    }

    #[test]
    fn first_declared_entry_wins() {
        // "/business" is also a string prefix of "/business-dashboard"; the
        // dashboard entry is declared first and must be the one that matches.
        assert_eq!(required_roles("/business-dashboard"), &[UserRole::Business]);
        assert_eq!(required_roles("/client-dashboard"), &[UserRole::Client]);
    }

    #[test]
    fn access_matches_required_role_membership() {
        // has_route_access(R, P) iff R ∈ required_roles(P), or P is public.
        let sample_paths = [
            "/",
            "/login",
            "/admin",
            "/admin/subscriptions",
            "/business",
            "/business-dashboard",
            "/business/appointments",
            "/client",
            "/client-dashboard",
            "/client/appointments",
            "/unknown/anything",
        ];
        for path in sample_paths {
            for role in [UserRole::Client, UserRole::Business, UserRole::Admin] {
                let expected = !is_protected_route(path) || required_roles(path).contains(&role);
                assert_eq!(has_route_access(role, path), expected, "{} / {}", role, path);
            }
        }
    }

    #[test]
    fn roles_are_segregated() {
        assert!(has_route_access(UserRole::Business, "/business/services"));
        assert!(!has_route_access(UserRole::Business, "/client/appointments"));
        assert!(!has_route_access(UserRole::Client, "/admin"));
        assert!(!has_route_access(UserRole::Admin, "/client-dashboard"));
    }
}
