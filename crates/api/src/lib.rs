mod env;
mod global_state;
mod middleware;
mod response;
mod routes;
mod utils;

pub use routes::{
    admin_routes,
    auth_routes,
    business_routes,
    client_routes,
    misc_routes,
    stripe_routes,
};

pub use env::ApiServerEnv;
pub use global_state::GlobalState;
pub use middleware::{admin_only, authenticate, business_only, client_only, ensure_account};
pub use response::{AppError, AppSuccess};
pub use utils::setup_tracing;
