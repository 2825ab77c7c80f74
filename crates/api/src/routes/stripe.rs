use anyhow::anyhow;
use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    middleware,
    routing::post, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::types::Uuid;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    EventObject, EventType, Webhook,
};

use bizli_booking::{
    Appointment, AppointmentStatus, Business, ClientPayment, PaymentStatus, PlanTier, Service,
    Subscription, SubscriptionStatus, UserProfile,
};
use bizli_common::EnvVars;
use bizli_database::{QueryCriteria, SqlxCrud, SqlxFilterQuery};

use crate::middleware::{authenticate, business_only, client_only};
use crate::response::{AppError, AppSuccess};
use crate::{ApiServerEnv, GlobalState};

pub fn stripe_routes(state: &GlobalState) -> Router<GlobalState> {
    Router::new()
        .route(
            "/stripe/checkout/subscription",
            post(create_subscription_checkout)
                .route_layer(middleware::from_fn_with_state(state.clone(), business_only))
                .route_layer(middleware::from_fn(authenticate)),
        )
        .route(
            "/stripe/checkout/appointment",
            post(create_appointment_checkout)
                .route_layer(middleware::from_fn_with_state(state.clone(), client_only))
                .route_layer(middleware::from_fn(authenticate)),
        )
        .route("/stripe/webhook/subscriptions", post(subscriptions_webhook))
        .route("/stripe/webhook/payments", post(payments_webhook))
}

fn origin_of(headers: &HeaderMap) -> &str {
    headers
        .get("origin")
        .and_then(|o| o.to_str().ok())
        .unwrap_or("http://localhost:3000")
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionCheckoutRequest {
    pub business_id: Uuid,
    pub plan: String,
}

async fn create_subscription_checkout(
    State(state): State<GlobalState>,
    Extension(user): Extension<UserProfile>,
    headers: HeaderMap,
    Json(payload): Json<SubscriptionCheckoutRequest>,
) -> Result<AppSuccess, AppError> {
    let env = ApiServerEnv::load();

    let business = Business::find_by_id(payload.business_id, state.db.pool())
        .await?
        .filter(|b| b.owner_id == user.id)
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[subscription_checkout] Business not found")))?;

    let price_id = env.price_for_plan(&payload.plan)
        .ok_or_else(|| AppError::new(
            StatusCode::BAD_REQUEST,
            anyhow!("[subscription_checkout] No price configured for plan {}", payload.plan),
        ))?;

    let origin = origin_of(&headers);
    let success_url = format!("{}/business-dashboard?billing=success", origin);
    let cancel_url = format!("{}/business-dashboard?billing=cancelled", origin);
    let business_id_str = business.id.to_string();

    let mut metadata = std::collections::HashMap::new();
    metadata.insert("business_id".to_string(), business_id_str.clone());
    metadata.insert("plan".to_string(), payload.plan.clone());

    let params = CreateCheckoutSession {
        customer_email: Some(&user.email),
        client_reference_id: Some(&business_id_str),
        line_items: Some(vec![CreateCheckoutSessionLineItems {
            price: Some(price_id),
            quantity: Some(1),
            ..Default::default()
        }]),
        mode: Some(CheckoutSessionMode::Subscription),
        success_url: Some(&success_url),
        cancel_url: Some(&cancel_url),
        metadata: Some(metadata),
        ..Default::default()
    };

    let session = CheckoutSession::create(&state.stripe_client, params)
        .await
        .map_err(|e| AppError::internal(anyhow!("Stripe error: {}", e)))?;
    let url = session.url
        .ok_or_else(|| AppError::internal(anyhow!("Stripe error: no session url")))?;

    Ok(AppSuccess::new(
        StatusCode::OK,
        "Checkout session created",
        json!({ "url": url }),
    ))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppointmentCheckoutRequest {
    pub appointment_id: Uuid,
}

async fn create_appointment_checkout(
    State(state): State<GlobalState>,
    Extension(user): Extension<UserProfile>,
    headers: HeaderMap,
    Json(payload): Json<AppointmentCheckoutRequest>,
) -> Result<AppSuccess, AppError> {
    let appointment = Appointment::find_by_id(payload.appointment_id, state.db.pool())
        .await?
        .filter(|a| a.client_id == user.id)
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[appointment_checkout] Appointment not found")))?;

    if appointment.status != AppointmentStatus::Pending {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            anyhow!("[appointment_checkout] Appointment is {}", appointment.status),
        ));
    }

    let service = Service::find_by_id(appointment.service_id, state.db.pool())
        .await?
        .filter(|s| s.is_active)
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, anyhow!("[appointment_checkout] Service not found")))?;

    let price_id = service.stripe_price_id.clone()
        .ok_or_else(|| AppError::new(
            StatusCode::BAD_REQUEST,
            anyhow!("[appointment_checkout] Service is not payable online"),
        ))?;

    // The payment row id doubles as the checkout client reference, so the
    // webhook can find it without trusting anything else in the event.
    let payment_id = Uuid::new_v4();
    let payment_id_str = payment_id.to_string();

    let origin = origin_of(&headers);
    let success_url = format!("{}/client-dashboard?payment=success", origin);
    let cancel_url = format!("{}/client-dashboard?payment=cancelled", origin);

    let params = CreateCheckoutSession {
        customer_email: Some(&user.email),
        client_reference_id: Some(&payment_id_str),
        line_items: Some(vec![CreateCheckoutSessionLineItems {
            price: Some(price_id),
            quantity: Some(1),
            ..Default::default()
        }]),
        mode: Some(CheckoutSessionMode::Payment),
        success_url: Some(&success_url),
        cancel_url: Some(&cancel_url),
        ..Default::default()
    };

    let session = CheckoutSession::create(&state.stripe_client, params)
        .await
        .map_err(|e| AppError::internal(anyhow!("Stripe error: {}", e)))?;
    let url = session.url
        .ok_or_else(|| AppError::internal(anyhow!("Stripe error: no session url")))?;

    let mut payment = ClientPayment::new(
        payment_id,
        user.id,
        service.business_id,
        session.amount_total.unwrap_or(service.price_cents),
        session.currency.map(|c| c.to_string()).unwrap_or_else(|| "usd".to_string()),
    );
    payment.service_id = Some(service.id);
    payment.appointment_id = Some(appointment.id);
    payment.checkout_session_id = session.id.to_string();

    let mut tx = state.db.pool().begin().await?;
    payment.create(&mut *tx).await.map_err(|e| AppError::internal(e.into()))?;
    tx.commit().await?;

    Ok(AppSuccess::new(
        StatusCode::OK,
        "Checkout session created",
        json!({ "url": url, "payment_id": payment_id }),
    ))
}

fn parse_event(headers: &HeaderMap, body: &[u8], secret: &str) -> Result<stripe::Event, AppError> {
    let sig = headers
        .get("stripe-signature")
        .and_then(|s| s.to_str().ok())
        .ok_or_else(|| AppError::new(StatusCode::BAD_REQUEST, anyhow!("Missing stripe-signature header")))?;

    let body_str = std::str::from_utf8(body)
        .map_err(|e| AppError::new(StatusCode::BAD_REQUEST, anyhow!("Webhook error: {}", e)))?;

    Webhook::construct_event(body_str, sig, secret)
        .map_err(|e| AppError::new(StatusCode::BAD_REQUEST, anyhow!("Webhook error: {}", e)))
}

/// The business a checkout session belongs to: the client_reference_id when
/// it parses as a UUID, otherwise the `business_id` metadata entry.
fn resolve_business_reference(
    client_reference_id: Option<&str>,
    metadata: Option<&stripe::Metadata>,
) -> Option<Uuid> {
    client_reference_id
        .and_then(|s| Uuid::parse_str(s).ok())
        .or_else(|| {
            metadata
                .and_then(|m| m.get("business_id"))
                .and_then(|s| Uuid::parse_str(s).ok())
        })
}

fn plan_from_metadata(metadata: Option<&stripe::Metadata>) -> PlanTier {
    metadata
        .and_then(|m| m.get("plan"))
        .and_then(|p| p.parse().ok())
        .unwrap_or_default()
}

/// Receipt URL, when the event carries an expanded payment intent with its
/// latest charge. Webhook payloads usually ship bare ids, so this is
/// best-effort.
fn receipt_url_from_session(session: &CheckoutSession) -> Option<String> {
    match session.payment_intent.as_ref()? {
        stripe::Expandable::Object(intent) => match intent.latest_charge.as_ref()? {
            stripe::Expandable::Object(charge) => charge.receipt_url.clone(),
            stripe::Expandable::Id(_) => None,
        },
        stripe::Expandable::Id(_) => None,
    }
}

async fn subscriptions_webhook(
    State(state): State<GlobalState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<AppSuccess, AppError> {
    let env = ApiServerEnv::load();
    let event = parse_event(&headers, &body, &env.get_env_var("STRIPE_WEBHOOK_SECRET"))?;

    match event.type_ {
        EventType::CheckoutSessionCompleted => {
            if let EventObject::CheckoutSession(session) = event.data.object {
                let business_id = resolve_business_reference(
                    session.client_reference_id.as_deref(),
                    session.metadata.as_ref(),
                );
                let Some(business_id) = business_id else {
                    tracing::error!("[subscriptions_webhook] session {} has no business reference", session.id);
                    return Ok(AppSuccess::new(StatusCode::OK, "Webhook received", json!({ "received": true })));
                };

                let mut tx = state.db.pool().begin().await?;
                let business = Business::find_by_id(business_id, &mut *tx).await?;
                if business.is_none() {
                    tracing::error!("[subscriptions_webhook] unknown business {} in session {}", business_id, session.id);
                    tx.rollback().await?;
                    return Ok(AppSuccess::new(StatusCode::OK, "Webhook received", json!({ "received": true })));
                }

                let plan = plan_from_metadata(session.metadata.as_ref());
                let stripe_subscription_id = session
                    .subscription
                    .as_ref()
                    .map(|s| s.id().to_string())
                    .unwrap_or_default();

                // One row per business, latest event wins.
                let subscription = Subscription::new(business_id, plan, stripe_subscription_id);
                subscription
                    .upsert_on("business_id", &mut *tx)
                    .await
                    .map_err(|e| AppError::internal(e.into()))?;
                tx.commit().await?;

                tracing::info!("[subscriptions_webhook] business {} is now on {}", business_id, plan);
            }
        }
        EventType::InvoicePaymentFailed => {
            if let EventObject::Invoice(invoice) = event.data.object {
                let stripe_subscription_id = invoice.subscription.as_ref().map(|s| s.id().to_string());
                let Some(stripe_subscription_id) = stripe_subscription_id else {
                    return Ok(AppSuccess::new(StatusCode::OK, "Webhook received", json!({ "received": true })));
                };

                let mut tx = state.db.pool().begin().await?;
                let subscription = Subscription::find_one_by_criteria(
                    QueryCriteria::new()
                        .add_valued_filter("stripe_subscription_id", "=", stripe_subscription_id.clone()),
                    &mut *tx,
                ).await?;

                match subscription {
                    Some(mut subscription) => {
                        subscription.status = SubscriptionStatus::PastDue;
                        subscription.update(&mut *tx).await.map_err(|e| AppError::internal(e.into()))?;
                        tx.commit().await?;
                        tracing::warn!("[subscriptions_webhook] subscription {} is past due", stripe_subscription_id);
                    }
                    None => {
                        tracing::error!("[subscriptions_webhook] no subscription for {}", stripe_subscription_id);
                        tx.rollback().await?;
                    }
                }
            }
        }
        _ => {
            // unhandled event type
        }
    }

    Ok(AppSuccess::new(StatusCode::OK, "Webhook received", json!({ "received": true })))
}

async fn payments_webhook(
    State(state): State<GlobalState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<AppSuccess, AppError> {
    let env = ApiServerEnv::load();
    let event = parse_event(&headers, &body, &env.get_env_var("STRIPE_WEBHOOK_SECRET"))?;

    match event.type_ {
        EventType::CheckoutSessionCompleted => {
            if let EventObject::CheckoutSession(session) = event.data.object {
                let payment_id = session
                    .client_reference_id
                    .as_deref()
                    .and_then(|s| Uuid::parse_str(s).ok());
                let Some(payment_id) = payment_id else {
                    tracing::error!("[payments_webhook] session {} has no payment reference", session.id);
                    return Ok(AppSuccess::new(StatusCode::OK, "Webhook received", json!({ "received": true })));
                };

                let mut tx = state.db.pool().begin().await?;
                let payment = ClientPayment::find_by_id(payment_id, &mut *tx).await?;
                let Some(mut payment) = payment else {
                    tracing::error!("[payments_webhook] no payment {} for session {}", payment_id, session.id);
                    tx.rollback().await?;
                    return Ok(AppSuccess::new(StatusCode::OK, "Webhook received", json!({ "received": true })));
                };

                payment.payment_status = PaymentStatus::Completed;
                payment.checkout_session_id = session.id.to_string();
                payment.stripe_payment_id = session.payment_intent.as_ref().map(|pi| pi.id().to_string());
                payment.receipt_url = receipt_url_from_session(&session);
                let payment = payment.update(&mut *tx).await.map_err(|e| AppError::internal(e.into()))?;
                tx.commit().await?;

                // The payment is already committed; confirming the linked
                // appointment is best-effort and must not undo it.
                if let Some(appointment_id) = payment.appointment_id {
                    if let Err(e) = confirm_appointment(&state, appointment_id).await {
                        tracing::error!("[payments_webhook] failed to confirm appointment {}: {}", appointment_id, e.1);
                    }
                }
            }
        }
        EventType::PaymentIntentPaymentFailed => {
            if let EventObject::PaymentIntent(intent) = event.data.object {
                mark_payment(&state, &intent.id.to_string(), PaymentStatus::Failed).await?;
            }
        }
        EventType::ChargeDisputeCreated => {
            if let EventObject::Dispute(dispute) = event.data.object {
                let intent_id = dispute.payment_intent.as_ref().map(|pi| pi.id().to_string());
                if let Some(intent_id) = intent_id {
                    mark_payment(&state, &intent_id, PaymentStatus::Refunded).await?;
                }
            }
        }
        _ => {
            // unhandled event type
        }
    }

    Ok(AppSuccess::new(StatusCode::OK, "Webhook received", json!({ "received": true })))
}

async fn confirm_appointment(state: &GlobalState, appointment_id: Uuid) -> Result<(), AppError> {
    let mut tx = state.db.pool().begin().await?;
    let mut appointment = Appointment::find_by_id(appointment_id, &mut *tx)
        .await?
        .ok_or_else(|| AppError::internal(anyhow!("appointment {} not found", appointment_id)))?;

    appointment.transition_to(AppointmentStatus::Confirmed)?;
    appointment.update(&mut *tx).await.map_err(|e| AppError::internal(e.into()))?;
    tx.commit().await?;
    Ok(())
}

/// Flips the payment matching `stripe_payment_id`. Events for payments this
/// backend never issued are logged and acknowledged.
async fn mark_payment(
    state: &GlobalState, stripe_payment_id: &str, status: PaymentStatus,
) -> Result<(), AppError> {
    let mut tx = state.db.pool().begin().await?;
    let payment = ClientPayment::find_one_by_criteria(
        QueryCriteria::new()
            .add_valued_filter("stripe_payment_id", "=", stripe_payment_id.to_string()),
        &mut *tx,
    ).await?;

    match payment {
        Some(mut payment) => {
            payment.payment_status = status;
            payment.update(&mut *tx).await.map_err(|e| AppError::internal(e.into()))?;
            tx.commit().await?;
            tracing::info!("[mark_payment] {} -> {}", stripe_payment_id, status);
        }
        None => {
            tracing::error!("[mark_payment] no payment for intent {}", stripe_payment_id);
            tx.rollback().await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn stripe_signature(payload: &str, secret: &str) -> String {
        let timestamp = bizli_common::get_current_timestamp();
        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed_payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("t={},v1={}", timestamp, signature)
    }

    #[test]
    fn webhook_rejects_bad_signature() {
        let err = Webhook::construct_event("{}", "t=0,v1=deadbeef", "whsec_test").unwrap_err();
        assert!(matches!(err, stripe::WebhookError::BadSignature | stripe::WebhookError::BadTimestamp(_)));
    }

    #[test]
    fn webhook_rejects_tampered_body() {
        let sig = stripe_signature("{\"a\":1}", "whsec_test");
        let err = Webhook::construct_event("{\"a\":2}", &sig, "whsec_test").unwrap_err();
        assert!(matches!(err, stripe::WebhookError::BadSignature));
    }

    #[test]
    fn webhook_accepts_valid_signature() {
        // The body is not a valid event, so getting past the signature check
        // must surface as a parse failure rather than BadSignature.
        let sig = stripe_signature("{}", "whsec_test");
        let err = Webhook::construct_event("{}", &sig, "whsec_test").unwrap_err();
        assert!(!matches!(err, stripe::WebhookError::BadSignature));
    }

    #[test]
    fn business_reference_prefers_client_reference_id() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut metadata = stripe::Metadata::new();
        metadata.insert("business_id".to_string(), other.to_string());

        let id_str = id.to_string();
        assert_eq!(
            resolve_business_reference(Some(&id_str), Some(&metadata)),
            Some(id)
        );
    }

    #[test]
    fn business_reference_falls_back_to_metadata() {
        let id = Uuid::new_v4();
        let mut metadata = stripe::Metadata::new();
        metadata.insert("business_id".to_string(), id.to_string());

        assert_eq!(resolve_business_reference(None, Some(&metadata)), Some(id));
        assert_eq!(
            resolve_business_reference(Some("not-a-uuid"), Some(&metadata)),
            Some(id)
        );
        assert_eq!(resolve_business_reference(None, None), None);
    }

    #[test]
    fn plan_metadata_defaults_to_basic() {
        let mut metadata = stripe::Metadata::new();
        metadata.insert("plan".to_string(), "Premium".to_string());
        assert_eq!(plan_from_metadata(Some(&metadata)), PlanTier::Premium);

        metadata.insert("plan".to_string(), "garbage".to_string());
        assert_eq!(plan_from_metadata(Some(&metadata)), PlanTier::Basic);
        assert_eq!(plan_from_metadata(None), PlanTier::Basic);
    }
}
