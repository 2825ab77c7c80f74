mod guard;
mod routes;

pub use guard::{AuthSession, GuardDecision, RoleGuard, SessionUser};
pub use routes::{has_route_access, is_protected_route, paths, required_roles};
