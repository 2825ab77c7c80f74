use anyhow::anyhow;
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode, middleware,
    routing::{get, post}, Json, Router
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::types::Uuid;

use bizli_booking::{Appointment, AppointmentStatus, Business, Service, Subscription, UserProfile};
use bizli_database::{OrderDirection, QueryCriteria, SqlxCrud, SqlxFilterQuery};

use crate::middleware::{authenticate, authorize};
use crate::response::{AppError, AppSuccess};
use crate::GlobalState;

pub fn business_routes(state: &GlobalState) -> Router<GlobalState> {
    Router::new()
        .route("/business/register",
            post(register_business)
        )
        .route("/business/me",
            get(my_business)
        )
        .route("/business/update",
            post(update_business)
        )
        .route("/business/deactivate",
            post(deactivate_business)
        )
        .route("/business/services",
            get(list_services).post(create_service)
        )
        .route("/business/services/{id}/update",
            post(update_service)
        )
        .route("/business/services/{id}/deactivate",
            post(deactivate_service)
        )
        .route("/business/appointments",
            get(list_appointments)
        )
        .route("/business/appointments/{id}/status",
            post(set_appointment_status)
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), authorize))
        .route_layer(middleware::from_fn(authenticate))
}

/// The business owned by the caller. Business accounts own at most one.
async fn owned_business(state: &GlobalState, user: &UserProfile) -> Result<Option<Business>, AppError> {
    let business = Business::find_one_by_criteria(
        QueryCriteria::new().add_valued_filter("owner_id", "=", user.id),
        state.db.pool(),
    ).await?;
    Ok(business)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterBusinessRequest {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

async fn register_business(
    State(state): State<GlobalState>,
    Extension(user): Extension<UserProfile>,
    Json(payload): Json<RegisterBusinessRequest>,
) -> Result<AppSuccess, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::new(StatusCode::BAD_REQUEST, anyhow!("[register_business] Name is required")));
    }
    if owned_business(&state, &user).await?.is_some() {
        return Err(AppError::new(StatusCode::BAD_REQUEST, anyhow!("[register_business] Business already registered")));
    }

    let mut business = Business::new(user.id, payload.name.trim().to_string());
    business.description = payload.description;
    business.category = payload.category;
    business.address = payload.address;
    business.phone = payload.phone;
    business.latitude = payload.latitude;
    business.longitude = payload.longitude;

    let mut tx = state.db.pool().begin().await?;
    let business = business.create(&mut *tx).await.map_err(|e| AppError::internal(e.into()))?;
    tx.commit().await?;

    // New businesses start unapproved and stay invisible to clients until an
    // admin approves them.
    Ok(AppSuccess::new(StatusCode::OK, "Business registered, pending approval", json!(business)))
}

async fn my_business(
    State(state): State<GlobalState>,
    Extension(user): Extension<UserProfile>,
) -> Result<AppSuccess, AppError> {
    let business = owned_business(&state, &user).await?
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[my_business] No business registered")))?;

    let subscription = Subscription::find_one_by_criteria(
        QueryCriteria::new().add_valued_filter("business_id", "=", business.id),
        state.db.pool(),
    ).await?;

    Ok(AppSuccess::new(StatusCode::OK, "Business", json!({
        "business": business,
        "subscription": subscription,
    })))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateBusinessRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

async fn update_business(
    State(state): State<GlobalState>,
    Extension(user): Extension<UserProfile>,
    Json(payload): Json<UpdateBusinessRequest>,
) -> Result<AppSuccess, AppError> {
    let mut business = owned_business(&state, &user).await?
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[update_business] No business registered")))?;

    if let Some(name) = payload.name {
        if name.trim().is_empty() {
            return Err(AppError::new(StatusCode::BAD_REQUEST, anyhow!("[update_business] Name cannot be empty")));
        }
        business.name = name.trim().to_string();
    }
    if payload.description.is_some() { business.description = payload.description; }
    if payload.category.is_some() { business.category = payload.category; }
    if payload.address.is_some() { business.address = payload.address; }
    if payload.phone.is_some() { business.phone = payload.phone; }
    if payload.latitude.is_some() { business.latitude = payload.latitude; }
    if payload.longitude.is_some() { business.longitude = payload.longitude; }

    let mut tx = state.db.pool().begin().await?;
    let business = business.update(&mut *tx).await.map_err(|e| AppError::internal(e.into()))?;
    tx.commit().await?;

    Ok(AppSuccess::new(StatusCode::OK, "Business updated", json!(business)))
}

async fn deactivate_business(
    State(state): State<GlobalState>,
    Extension(user): Extension<UserProfile>,
) -> Result<AppSuccess, AppError> {
    let mut business = owned_business(&state, &user).await?
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[deactivate_business] No business registered")))?;

    business.is_active = false;
    let mut tx = state.db.pool().begin().await?;
    let business = business.update(&mut *tx).await.map_err(|e| AppError::internal(e.into()))?;
    tx.commit().await?;

    Ok(AppSuccess::new(StatusCode::OK, "Business deactivated", json!(business)))
}

async fn list_services(
    State(state): State<GlobalState>,
    Extension(user): Extension<UserProfile>,
) -> Result<AppSuccess, AppError> {
    let business = owned_business(&state, &user).await?
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[list_services] No business registered")))?;

    let services = Service::find_by_criteria(
        QueryCriteria::new()
            .add_valued_filter("business_id", "=", business.id)
            .order_by("created_at", OrderDirection::Asc),
        state.db.pool(),
    ).await?;

    Ok(AppSuccess::new(StatusCode::OK, "Services", json!(services)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub duration_minutes: i32,
    pub stripe_price_id: Option<String>,
}

async fn create_service(
    State(state): State<GlobalState>,
    Extension(user): Extension<UserProfile>,
    Json(payload): Json<CreateServiceRequest>,
) -> Result<AppSuccess, AppError> {
    let business = owned_business(&state, &user).await?
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[create_service] No business registered")))?;

    if payload.name.trim().is_empty() {
        return Err(AppError::new(StatusCode::BAD_REQUEST, anyhow!("[create_service] Name is required")));
    }
    if payload.price_cents < 0 {
        return Err(AppError::new(StatusCode::BAD_REQUEST, anyhow!("[create_service] Price cannot be negative")));
    }
    if payload.duration_minutes <= 0 {
        return Err(AppError::new(StatusCode::BAD_REQUEST, anyhow!("[create_service] Duration must be positive")));
    }

    let mut service = Service::new(
        business.id,
        payload.name.trim().to_string(),
        payload.price_cents,
        payload.duration_minutes,
    );
    service.description = payload.description;
    service.stripe_price_id = payload.stripe_price_id;

    let mut tx = state.db.pool().begin().await?;
    let service = service.create(&mut *tx).await.map_err(|e| AppError::internal(e.into()))?;
    tx.commit().await?;

    Ok(AppSuccess::new(StatusCode::OK, "Service created", json!(service)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub duration_minutes: Option<i32>,
    pub stripe_price_id: Option<String>,
    pub is_active: Option<bool>,
}

async fn owned_service(
    state: &GlobalState, user: &UserProfile, service_id: Uuid,
) -> Result<Service, AppError> {
    let business = owned_business(state, user).await?
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[owned_service] No business registered")))?;

    Service::find_by_id(service_id, state.db.pool())
        .await?
        .filter(|s| s.business_id == business.id)
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[owned_service] Service not found")))
}

async fn update_service(
    State(state): State<GlobalState>,
    Extension(user): Extension<UserProfile>,
    Path(service_id): Path<Uuid>,
    Json(payload): Json<UpdateServiceRequest>,
) -> Result<AppSuccess, AppError> {
    let mut service = owned_service(&state, &user, service_id).await?;

    if let Some(name) = payload.name {
        if name.trim().is_empty() {
            return Err(AppError::new(StatusCode::BAD_REQUEST, anyhow!("[update_service] Name cannot be empty")));
        }
        service.name = name.trim().to_string();
    }
    if payload.description.is_some() { service.description = payload.description; }
    if let Some(price_cents) = payload.price_cents {
        if price_cents < 0 {
            return Err(AppError::new(StatusCode::BAD_REQUEST, anyhow!("[update_service] Price cannot be negative")));
        }
        service.price_cents = price_cents;
    }
    if let Some(duration_minutes) = payload.duration_minutes {
        if duration_minutes <= 0 {
            return Err(AppError::new(StatusCode::BAD_REQUEST, anyhow!("[update_service] Duration must be positive")));
        }
        service.duration_minutes = duration_minutes;
    }
    if payload.stripe_price_id.is_some() { service.stripe_price_id = payload.stripe_price_id; }
    if let Some(is_active) = payload.is_active { service.is_active = is_active; }

    let mut tx = state.db.pool().begin().await?;
    let service = service.update(&mut *tx).await.map_err(|e| AppError::internal(e.into()))?;
    tx.commit().await?;

    Ok(AppSuccess::new(StatusCode::OK, "Service updated", json!(service)))
}

async fn deactivate_service(
    State(state): State<GlobalState>,
    Extension(user): Extension<UserProfile>,
    Path(service_id): Path<Uuid>,
) -> Result<AppSuccess, AppError> {
    let mut service = owned_service(&state, &user, service_id).await?;

    service.is_active = false;
    let mut tx = state.db.pool().begin().await?;
    let service = service.update(&mut *tx).await.map_err(|e| AppError::internal(e.into()))?;
    tx.commit().await?;

    Ok(AppSuccess::new(StatusCode::OK, "Service deactivated", json!(service)))
}

async fn list_appointments(
    State(state): State<GlobalState>,
    Extension(user): Extension<UserProfile>,
) -> Result<AppSuccess, AppError> {
    let business = owned_business(&state, &user).await?
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[list_appointments] No business registered")))?;

    let appointments = Appointment::find_by_criteria(
        QueryCriteria::new()
            .add_valued_filter("business_id", "=", business.id)
            .order_by("scheduled_at", OrderDirection::Asc),
        state.db.pool(),
    ).await?;

    Ok(AppSuccess::new(StatusCode::OK, "Appointments", json!(appointments)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetAppointmentStatusRequest {
    pub status: AppointmentStatus,
}

async fn set_appointment_status(
    State(state): State<GlobalState>,
    Extension(user): Extension<UserProfile>,
    Path(appointment_id): Path<Uuid>,
    Json(payload): Json<SetAppointmentStatusRequest>,
) -> Result<AppSuccess, AppError> {
    let business = owned_business(&state, &user).await?
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[set_appointment_status] No business registered")))?;

    let mut tx = state.db.pool().begin().await?;
    let mut appointment = Appointment::find_by_id(appointment_id, &mut *tx)
        .await?
        .filter(|a| a.business_id == business.id)
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[set_appointment_status] Appointment not found")))?;

    appointment.transition_to(payload.status)?;
    let appointment = appointment.update(&mut *tx).await.map_err(|e| AppError::internal(e.into()))?;
    tx.commit().await?;

    Ok(AppSuccess::new(StatusCode::OK, "Appointment updated", json!(appointment)))
}
