//! Stripe checkout initiation and the billing webhook. The webhook is the
//! only writer of the subscriptions table; checkout only creates the customer
//! mapping and hands the user a redirect URL.

use crate::models::stripe_customers::NewStripeCustomer;
use crate::models::subscriptions::{NewSubscription, Plan, STATUS_ACTIVE};
use crate::models::users::User;
use crate::web::auth::require_auth;
use crate::{ApiError, AppState};
use axum::{
    extract::State,
    http::HeaderMap,
    middleware::from_fn_with_state,
    routing::post,
    Extension, Json, Router,
};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use stripe::{
    CheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCheckoutSessionPaymentMethodTypes,
    CreateCheckoutSessionSubscriptionData, CreateCustomer, Customer, EventObject, EventType,
    Expandable, Subscription as StripeSubscription, SubscriptionId, Webhook,
};
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

pub fn router(app_state: Arc<AppState>) -> Router<()> {
    Router::new()
        .route(
            "/api/stripe/checkout",
            post(create_checkout).layer(from_fn_with_state(app_state.clone(), require_auth)),
        )
        .route("/api/stripe/webhook", post(stripe_webhook))
        .with_state(app_state)
}

/// Look up the user's billing-provider customer, creating it on first use.
/// One provider call and one storage write happen only on that first use.
async fn get_or_create_stripe_customer(
    state: &Arc<AppState>,
    user: &User,
) -> Result<String, ApiError> {
    if let Some(existing) = state.db.get_stripe_customer_for_user(user.uuid)? {
        debug!("Reusing stripe customer for user {}", user.uuid);
        return Ok(existing.stripe_customer_id);
    }

    info!("Creating stripe customer for user {}", user.uuid);
    let client = Client::new(state.config.stripe_secret_key.clone());
    let customer = Customer::create(
        &client,
        CreateCustomer {
            email: Some(&user.email),
            name: user.name.as_deref(),
            // Links the provider object back to our user in webhook payloads.
            metadata: Some(HashMap::from([(
                "userId".to_string(),
                user.uuid.to_string(),
            )])),
            ..Default::default()
        },
    )
    .await
    .map_err(|e| {
        error!("Stripe customer creation failed for {}: {}", user.uuid, e);
        ApiError::InternalServerError
    })?;

    state.db.create_stripe_customer(NewStripeCustomer {
        user_id: user.uuid,
        stripe_customer_id: customer.id.to_string(),
    })?;

    Ok(customer.id.to_string())
}

async fn create_checkout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    debug!("Entering create_checkout for user {}", user.uuid);

    let customer_id = get_or_create_stripe_customer(&state, &user).await?;
    let client = Client::new(state.config.stripe_secret_key.clone());

    let success_url = format!("{}/subscription?success=true", state.config.app_url);
    let cancel_url = format!("{}/subscription?canceled=true", state.config.app_url);
    // userId goes on both the session and the subscription-to-be: checkout
    // events carry session metadata, later subscription events carry their own.
    let metadata = HashMap::from([("userId".to_string(), user.uuid.to_string())]);

    let mut params = CreateCheckoutSession::new();
    params.mode = Some(CheckoutSessionMode::Subscription);
    params.customer = Some(customer_id.parse().map_err(|_| {
        error!("Stored stripe customer id is invalid: {}", customer_id);
        ApiError::InternalServerError
    })?);
    params.payment_method_types = Some(vec![CreateCheckoutSessionPaymentMethodTypes::Card]);
    params.line_items = Some(vec![CreateCheckoutSessionLineItems {
        price: Some(state.config.stripe_pro_price_id.clone()),
        quantity: Some(1),
        ..Default::default()
    }]);
    params.success_url = Some(&success_url);
    params.cancel_url = Some(&cancel_url);
    params.metadata = Some(metadata.clone());
    params.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
        metadata: Some(metadata),
        ..Default::default()
    });

    let session = CheckoutSession::create(&client, params).await.map_err(|e| {
        error!("Checkout session creation failed for {}: {}", user.uuid, e);
        ApiError::InternalServerError
    })?;

    let url = session.url.ok_or_else(|| {
        error!("Checkout session for {} has no redirect URL", user.uuid);
        ApiError::InternalServerError
    })?;

    info!("Checkout session created for user {}", user.uuid);
    Ok(Json(CheckoutResponse { url }))
}

/// Provider timestamps arrive as epoch seconds.
fn epoch_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Row written for a completed checkout. Plan and status are fixed: a
/// completed checkout always activates PRO. Returns None on unrepresentable
/// period bounds.
fn pro_subscription_record(
    user_id: Uuid,
    customer_id: String,
    price_id: String,
    subscription_id: String,
    period_start_secs: i64,
    period_end_secs: i64,
    cancel_at_period_end: bool,
) -> Option<NewSubscription> {
    Some(NewSubscription {
        user_id,
        plan: Plan::Pro.as_str().to_string(),
        status: STATUS_ACTIVE.to_string(),
        stripe_customer_id: customer_id,
        stripe_price_id: price_id,
        stripe_subscription_id: subscription_id,
        current_period_start: epoch_to_datetime(period_start_secs)?,
        current_period_end: epoch_to_datetime(period_end_secs)?,
        cancel_at_period_end,
    })
}

pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    debug!("Entering stripe_webhook handler");

    // Signature problems are the caller's fault (400) so Stripe's retry
    // policy can tell them apart from our processing failures (500).
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            error!("Webhook request missing Stripe-Signature header");
            ApiError::BadRequest
        })?;

    let secret = &state.config.stripe_webhook_secret;
    if secret.is_empty() {
        error!("Webhook secret is not configured");
        return Err(ApiError::BadRequest);
    }

    let payload = std::str::from_utf8(&body).map_err(|_| {
        error!("Webhook payload is not valid UTF-8");
        ApiError::BadRequest
    })?;

    let event = Webhook::construct_event(payload, signature, secret).map_err(|e| {
        error!("Webhook signature verification failed: {}", e);
        ApiError::BadRequest
    })?;

    if event.type_ == EventType::CheckoutSessionCompleted {
        if let EventObject::CheckoutSession(session) = event.data.object {
            handle_checkout_completed(&state, session).await?;
        }
    } else {
        // Acknowledged but ignored; Stripe sends many event types per checkout.
        debug!("Ignoring webhook event type {:?}", event.type_);
    }

    Ok(Json(json!({ "received": true })))
}

async fn handle_checkout_completed(
    state: &Arc<AppState>,
    session: CheckoutSession,
) -> Result<(), ApiError> {
    let user_id: Uuid = session
        .metadata
        .as_ref()
        .and_then(|m| m.get("userId"))
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| {
            error!("Checkout session {} has no usable userId metadata", session.id);
            ApiError::InternalServerError
        })?;

    let subscription_id: SubscriptionId = match &session.subscription {
        Some(Expandable::Id(id)) => id.clone(),
        Some(Expandable::Object(subscription)) => subscription.id.clone(),
        None => {
            error!("Checkout session {} carries no subscription", session.id);
            return Err(ApiError::InternalServerError);
        }
    };

    // The completed-checkout event doesn't include period details; fetch the
    // full subscription object from the provider.
    let client = Client::new(state.config.stripe_secret_key.clone());
    let subscription = StripeSubscription::retrieve(&client, &subscription_id, &[])
        .await
        .map_err(|e| {
            error!("Failed to retrieve subscription {}: {}", subscription_id, e);
            ApiError::InternalServerError
        })?;

    let price_id = subscription
        .items
        .data
        .first()
        .and_then(|item| item.price.as_ref())
        .map(|price| price.id.to_string())
        .ok_or_else(|| {
            error!("Subscription {} has no price item", subscription_id);
            ApiError::InternalServerError
        })?;

    let customer_id = match &subscription.customer {
        Expandable::Id(id) => id.to_string(),
        Expandable::Object(customer) => customer.id.to_string(),
    };

    let record = pro_subscription_record(
        user_id,
        customer_id,
        price_id,
        subscription_id.to_string(),
        subscription.current_period_start,
        subscription.current_period_end,
        subscription.cancel_at_period_end,
    )
    .ok_or_else(|| {
        error!("Subscription {} has invalid period bounds", subscription_id);
        ApiError::InternalServerError
    })?;

    state.db.upsert_subscription(record)?;

    info!("PRO subscription recorded for user {}", user_id);
    Ok(())
}
