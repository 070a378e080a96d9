//! Payment lifecycle handlers.
//!
//! Thin adapters between the HTTP surface and the lifecycle manager;
//! all state-transition logic lives in `services::lifecycle`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    middleware::{AuthContext, Role},
    models::{Payment, PaymentFilter, PaymentStats, PaymentStatus, PaymentType},
    services::metrics::{record_swept, record_verification},
    AppState,
};

/// Payment response DTO.
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub property_id: Uuid,
    pub room_id: Option<Uuid>,
    pub amount: f64,
    pub currency: String,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub period: String,
    pub due_date: String,
    pub paid_at: Option<String>,
    pub late_fee: Option<f64>,
    pub transaction_ref: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub notes: Option<String>,
    /// True for a transient current-period projection.
    pub projection: bool,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        let projection = p.is_projection();
        Self {
            id: p.id,
            tenant_id: p.tenant_id,
            property_id: p.property_id,
            room_id: p.room_id,
            amount: p.amount,
            currency: p.currency,
            payment_type: p.payment_type,
            status: p.status,
            period: p.period,
            due_date: p.due_date.to_rfc3339(),
            paid_at: p.paid_at.map(|at| at.to_rfc3339()),
            late_fee: p.late_fee,
            transaction_ref: p.transaction_ref,
            gateway_payment_id: p.gateway_payment_id,
            notes: p.notes,
            projection,
        }
    }
}

/// Query parameters for listing a tenant's payments. Comma-separated
/// status/type sets; unknown values are rejected.
#[derive(Debug, Default, Deserialize)]
pub struct ListPaymentsQuery {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub payment_type: Option<String>,
    pub period: Option<String>,
}

impl ListPaymentsQuery {
    fn into_filter(self) -> Result<PaymentFilter, AppError> {
        let statuses = self
            .status
            .map(|raw| {
                raw.split(',')
                    .map(|s| {
                        PaymentStatus::parse(s.trim()).ok_or_else(|| {
                            AppError::BadRequest(anyhow::anyhow!("Unknown status: {s}"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        let payment_types = self
            .payment_type
            .map(|raw| {
                raw.split(',')
                    .map(|s| {
                        PaymentType::parse(s.trim()).ok_or_else(|| {
                            AppError::BadRequest(anyhow::anyhow!("Unknown payment type: {s}"))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        Ok(PaymentFilter {
            statuses,
            payment_types,
            period: self.period,
        })
    }
}

fn ensure_tenant_access(auth: &AuthContext, tenant_id: Uuid) -> Result<(), AppError> {
    if !auth.can_access_tenant(tenant_id) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Not authorized for this tenant"
        )));
    }
    Ok(())
}

/// Current obligation for a tenant; null when none.
pub async fn get_obligation(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<Option<PaymentResponse>>, AppError> {
    ensure_tenant_access(&auth, tenant_id)?;

    let obligation = state.lifecycle.current_obligation(tenant_id).await?;
    Ok(Json(obligation.map(PaymentResponse::from)))
}

pub async fn list_payments(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<Vec<PaymentResponse>>, AppError> {
    ensure_tenant_access(&auth, tenant_id)?;

    let filter = query.into_filter()?;
    let payments = state.lifecycle.list_payments(tenant_id, &filter).await?;
    Ok(Json(payments.into_iter().map(PaymentResponse::from).collect()))
}

pub async fn list_pending(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<Vec<PaymentResponse>>, AppError> {
    ensure_tenant_access(&auth, tenant_id)?;

    let payments = state.lifecycle.list_pending(tenant_id).await?;
    Ok(Json(payments.into_iter().map(PaymentResponse::from).collect()))
}

pub async fn get_stats(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<PaymentStats>, AppError> {
    ensure_tenant_access(&auth, tenant_id)?;

    let payments = state
        .lifecycle
        .list_payments(tenant_id, &PaymentFilter::default())
        .await?;
    Ok(Json(PaymentStats::compute(&payments)))
}

/// Request to open a gateway checkout for a payment. `payment_id` may be
/// the nil projection sentinel to pay the current obligation.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub payment_id: Uuid,
    pub tenant_id: Uuid,
    pub property_id: Uuid,
}

pub async fn create_order(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<crate::services::CheckoutOrder>), AppError> {
    // Only the owning tenant may initiate checkout.
    if auth.role != Role::Tenant || auth.user_id != payload.tenant_id {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Checkout must be initiated by the owning tenant"
        )));
    }

    tracing::info!(
        payment_id = %payload.payment_id,
        tenant_id = %payload.tenant_id,
        "Creating gateway order"
    );

    let checkout = state
        .lifecycle
        .process_online_payment(payload.payment_id, payload.tenant_id, payload.property_id)
        .await?;

    Ok((StatusCode::CREATED, Json(checkout)))
}

/// Request to verify a payment after checkout.
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub payment_id: Uuid,
    pub order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

/// Response after verifying a payment.
#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub payment_id: Uuid,
    pub success: bool,
    pub message: String,
}

pub async fn verify_payment(
    State(state): State<AppState>,
    _auth: AuthContext,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    tracing::info!(
        payment_id = %payload.payment_id,
        order_id = %payload.order_id,
        gateway_payment_id = %payload.gateway_payment_id,
        "Verifying payment"
    );

    let success = state
        .lifecycle
        .verify_payment(
            payload.payment_id,
            &payload.order_id,
            &payload.gateway_payment_id,
            &payload.signature,
        )
        .await?;

    let message = if success {
        record_verification("success");
        "Payment verified successfully"
    } else {
        record_verification("failure");
        "Payment verification failed - invalid signature"
    };

    Ok(Json(VerifyPaymentResponse {
        payment_id: payload.payment_id,
        success,
        message: message.to_string(),
    }))
}

/// Overdue sweep; intended for a periodic external trigger, not user
/// interaction.
pub async fn sweep_overdue(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<serde_json::Value>, AppError> {
    if auth.role != Role::Owner {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Sweep requires the owner role"
        )));
    }

    let transitioned = state.lifecycle.mark_overdue_payments().await?;
    record_swept(transitioned);

    Ok(Json(json!({ "transitioned": transitioned })))
}
