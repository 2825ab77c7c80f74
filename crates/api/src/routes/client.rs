use anyhow::anyhow;
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode, middleware,
    routing::{get, post}, Json, Router
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::types::Uuid;

use bizli_booking::{Appointment, AppointmentStatus, Business, ClientPayment, Service, UserProfile};
use bizli_database::{OrderDirection, QueryCriteria, SqlxCrud, SqlxFilterQuery};

use crate::middleware::{authenticate, authorize};
use crate::response::{AppError, AppSuccess};
use crate::GlobalState;

pub fn client_routes(state: &GlobalState) -> Router<GlobalState> {
    Router::new()
        .route("/client/businesses",
            get(list_businesses)
        )
        .route("/client/businesses/{id}/services",
            get(list_business_services)
        )
        .route("/client/appointments",
            get(list_appointments)
        )
        .route("/client/appointments/book",
            post(book_appointment)
        )
        .route("/client/appointments/{id}/cancel",
            post(cancel_appointment)
        )
        .route("/client/payments",
            get(list_payments)
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), authorize))
        .route_layer(middleware::from_fn(authenticate))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiscoveryQuery {
    pub category: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_km: Option<f64>,
}

async fn list_businesses(
    State(state): State<GlobalState>,
    Query(query): Query<DiscoveryQuery>,
) -> Result<AppSuccess, AppError> {
    let mut criteria = QueryCriteria::new()
        .add_valued_filter("is_approved", "=", true)
        .add_valued_filter("is_active", "=", true)
        .order_by("name", OrderDirection::Asc);
    if let Some(category) = query.category.clone() {
        criteria = criteria.add_valued_filter("category", "=", category);
    }

    let businesses = Business::find_by_criteria(criteria, state.db.pool()).await?;

    // Distance filtering happens here; businesses without coordinates never
    // match a geo query.
    let businesses: Vec<Business> = match (query.latitude, query.longitude, query.radius_km) {
        (Some(lat), Some(lng), Some(radius_km)) => businesses
            .into_iter()
            .filter(|b| b.distance_km_from(lat, lng).is_some_and(|d| d <= radius_km))
            .collect(),
        _ => businesses,
    };

    Ok(AppSuccess::new(StatusCode::OK, "Businesses", json!(businesses)))
}

async fn list_business_services(
    State(state): State<GlobalState>,
    Path(business_id): Path<Uuid>,
) -> Result<AppSuccess, AppError> {
    let business = Business::find_by_id(business_id, state.db.pool())
        .await?
        .filter(|b| b.is_visible_to_clients())
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[list_business_services] Business not found")))?;

    let services = Service::find_by_criteria(
        QueryCriteria::new()
            .add_valued_filter("business_id", "=", business.id)
            .add_valued_filter("is_active", "=", true)
            .order_by("name", OrderDirection::Asc),
        state.db.pool(),
    ).await?;

    Ok(AppSuccess::new(StatusCode::OK, "Services", json!(services)))
}

async fn list_appointments(
    State(state): State<GlobalState>,
    Extension(user): Extension<UserProfile>,
) -> Result<AppSuccess, AppError> {
    let appointments = Appointment::find_by_criteria(
        QueryCriteria::new()
            .add_valued_filter("client_id", "=", user.id)
            .order_by("scheduled_at", OrderDirection::Asc),
        state.db.pool(),
    ).await?;

    Ok(AppSuccess::new(StatusCode::OK, "Appointments", json!(appointments)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub business_id: Uuid,
    pub service_id: Uuid,
    pub scheduled_at: i64,
    pub notes: Option<String>,
}

async fn book_appointment(
    State(state): State<GlobalState>,
    Extension(user): Extension<UserProfile>,
    Json(payload): Json<BookAppointmentRequest>,
) -> Result<AppSuccess, AppError> {
    let business = Business::find_by_id(payload.business_id, state.db.pool())
        .await?
        .filter(|b| b.is_visible_to_clients())
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[book_appointment] Business not found")))?;

    let service = Service::find_by_id(payload.service_id, state.db.pool())
        .await?
        .filter(|s| s.business_id == business.id && s.is_active)
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[book_appointment] Service not found")))?;

    if payload.scheduled_at <= bizli_common::get_current_timestamp() as i64 {
        return Err(AppError::new(StatusCode::BAD_REQUEST, anyhow!("[book_appointment] Cannot book in the past")));
    }

    let mut appointment = Appointment::new(business.id, service.id, user.id, payload.scheduled_at);
    appointment.notes = payload.notes;

    let mut tx = state.db.pool().begin().await?;
    let appointment = appointment.create(&mut *tx).await.map_err(|e| AppError::internal(e.into()))?;
    tx.commit().await?;

    Ok(AppSuccess::new(StatusCode::OK, "Appointment booked", json!(appointment)))
}

async fn cancel_appointment(
    State(state): State<GlobalState>,
    Extension(user): Extension<UserProfile>,
    Path(appointment_id): Path<Uuid>,
) -> Result<AppSuccess, AppError> {
    let mut tx = state.db.pool().begin().await?;
    let mut appointment = Appointment::find_by_id(appointment_id, &mut *tx)
        .await?
        .filter(|a| a.client_id == user.id)
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[cancel_appointment] Appointment not found")))?;

    appointment.transition_to(AppointmentStatus::Cancelled)?;
    let appointment = appointment.update(&mut *tx).await.map_err(|e| AppError::internal(e.into()))?;
    tx.commit().await?;

    Ok(AppSuccess::new(StatusCode::OK, "Appointment cancelled", json!(appointment)))
}

async fn list_payments(
    State(state): State<GlobalState>,
    Extension(user): Extension<UserProfile>,
) -> Result<AppSuccess, AppError> {
    let payments = ClientPayment::find_by_criteria(
        QueryCriteria::new()
            .add_valued_filter("client_id", "=", user.id)
            .order_by("created_at", OrderDirection::Desc),
        state.db.pool(),
    ).await?;

    Ok(AppSuccess::new(StatusCode::OK, "Payments", json!(payments)))
}
