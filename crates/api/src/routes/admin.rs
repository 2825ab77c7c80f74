use anyhow::anyhow;
use axum::{
    extract::{Path, State},
    http::StatusCode, middleware,
    routing::{get, post}, Json, Router
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::types::Uuid;

use bizli_booking::{Business, Subscription, UserProfile, UserRole};
use bizli_database::{OrderDirection, QueryCriteria, SqlxCrud, SqlxFilterQuery};

use crate::middleware::{authenticate, authorize};
use crate::response::{AppError, AppSuccess};
use crate::GlobalState;

pub fn admin_routes(state: &GlobalState) -> Router<GlobalState> {
    Router::new()
        .route("/admin/businesses",
            get(list_businesses)
        )
        .route("/admin/businesses/{id}/approve",
            post(approve_business)
        )
        .route("/admin/businesses/{id}/deactivate",
            post(deactivate_business)
        )
        .route("/admin/subscriptions",
            get(list_subscriptions)
        )
        .route("/admin/users",
            get(list_users)
        )
        .route("/admin/users/{id}/role",
            post(set_user_role)
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), authorize))
        .route_layer(middleware::from_fn(authenticate))
}

async fn list_businesses(
    State(state): State<GlobalState>,
) -> Result<AppSuccess, AppError> {
    let businesses = Business::find_by_criteria(
        QueryCriteria::new().order_by("created_at", OrderDirection::Desc),
        state.db.pool(),
    ).await?;

    Ok(AppSuccess::new(StatusCode::OK, "Businesses", json!(businesses)))
}

async fn approve_business(
    State(state): State<GlobalState>,
    Path(business_id): Path<Uuid>,
) -> Result<AppSuccess, AppError> {
    let mut tx = state.db.pool().begin().await?;
    let mut business = Business::find_by_id(business_id, &mut *tx)
        .await?
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[approve_business] Business not found")))?;

    business.is_approved = true;
    let business = business.update(&mut *tx).await.map_err(|e| AppError::internal(e.into()))?;
    tx.commit().await?;

    tracing::info!("[approve_business] approved {}", business.id);
    Ok(AppSuccess::new(StatusCode::OK, "Business approved", json!(business)))
}

async fn deactivate_business(
    State(state): State<GlobalState>,
    Path(business_id): Path<Uuid>,
) -> Result<AppSuccess, AppError> {
    let mut tx = state.db.pool().begin().await?;
    let mut business = Business::find_by_id(business_id, &mut *tx)
        .await?
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[deactivate_business] Business not found")))?;

    business.is_active = false;
    let business = business.update(&mut *tx).await.map_err(|e| AppError::internal(e.into()))?;
    tx.commit().await?;

    Ok(AppSuccess::new(StatusCode::OK, "Business deactivated", json!(business)))
}

async fn list_subscriptions(
    State(state): State<GlobalState>,
) -> Result<AppSuccess, AppError> {
    let subscriptions = Subscription::find_by_criteria(
        QueryCriteria::new().order_by("updated_at", OrderDirection::Desc),
        state.db.pool(),
    ).await?;

    Ok(AppSuccess::new(StatusCode::OK, "Subscriptions", json!(subscriptions)))
}

async fn list_users(
    State(state): State<GlobalState>,
) -> Result<AppSuccess, AppError> {
    let users = UserProfile::find_by_criteria(
        QueryCriteria::new().order_by("created_at", OrderDirection::Desc),
        state.db.pool(),
    ).await?;

    Ok(AppSuccess::new(StatusCode::OK, "Users", json!(users)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetUserRoleRequest {
    pub role: UserRole,
}

/// The only write path for roles. Registration is locked to client and
/// business; promoting to admin additionally requires the target's email to
/// be on the allowlist, otherwise the guard would lock the account out.
async fn set_user_role(
    State(state): State<GlobalState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<SetUserRoleRequest>,
) -> Result<AppSuccess, AppError> {
    let mut tx = state.db.pool().begin().await?;
    let mut user = UserProfile::find_by_id(user_id, &mut *tx)
        .await?
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[set_user_role] User not found")))?;

    if payload.role == UserRole::Admin && !state.guard.is_admin_email(&user.email) {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            anyhow!("[set_user_role] {} is not on the admin email allowlist", user.email),
        ));
    }

    user.role = payload.role;
    let user = user.update(&mut *tx).await.map_err(|e| AppError::internal(e.into()))?;
    tx.commit().await?;

    tracing::info!("[set_user_role] {} is now {}", user.id, user.role);
    Ok(AppSuccess::new(StatusCode::OK, "Role updated", json!(user)))
}
