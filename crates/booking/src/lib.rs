pub mod access;

mod appointment;
mod business;
mod db;
mod payment;
mod service;
mod subscription;
mod user;

pub use appointment::{Appointment, AppointmentStatus};
pub use business::{distance_km, Business};
pub use db::PostgresClient;
pub use payment::{ClientPayment, PaymentStatus};
pub use service::Service;
pub use subscription::{PlanTier, Subscription, SubscriptionStatus};
pub use user::{UserProfile, UserRole};
