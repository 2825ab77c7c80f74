mod admin;
mod auth;
mod business;
mod client;
mod misc;
mod stripe;

pub use admin::admin_routes;
pub use auth::auth_routes;
pub use business::business_routes;
pub use client::client_routes;
pub use misc::misc_routes;
pub use stripe::stripe_routes;
