use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, serde_helpers};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::AppError;
use crate::models::datetime;

/// Lifecycle state of a booking.
///
/// Older documents carry lowercase values (`pending`, `confirmed`, ...). They
/// are accepted on read and on input, and every write stores the canonical
/// upper-case form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    #[serde(alias = "pending")]
    PaymentDone,
    IdPending,
    IdSubmitted,
    #[serde(alias = "confirmed")]
    Confirmed,
    #[serde(alias = "completed")]
    Completed,
    #[serde(alias = "rejected")]
    Rejected,
    #[serde(alias = "cancelled")]
    Cancelled,
    RefundPending,
    #[serde(alias = "refunded")]
    Refunded,
}

impl BookingStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentDone => "PAYMENT_DONE",
            Self::IdPending => "ID_PENDING",
            Self::IdSubmitted => "ID_SUBMITTED",
            Self::Confirmed => "CONFIRMED",
            Self::Completed => "COMPLETED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
            Self::RefundPending => "REFUND_PENDING",
            Self::Refunded => "REFUNDED",
        }
    }

    /// Whether the booking is included in the hotel/user aggregate counters.
    pub const fn is_counted(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::Rejected)
    }

    /// Statuses after which the counters must not be released again.
    pub const fn has_released_counters(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Rejected | Self::Refunded)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAYMENT_DONE" | "pending" => Ok(Self::PaymentDone),
            "ID_PENDING" => Ok(Self::IdPending),
            "ID_SUBMITTED" => Ok(Self::IdSubmitted),
            "CONFIRMED" | "confirmed" => Ok(Self::Confirmed),
            "COMPLETED" | "completed" => Ok(Self::Completed),
            "REJECTED" | "rejected" => Ok(Self::Rejected),
            "CANCELLED" | "cancelled" => Ok(Self::Cancelled),
            "REFUND_PENDING" => Ok(Self::RefundPending),
            "REFUNDED" | "refunded" => Ok(Self::Refunded),
            other => Err(AppError::invalid_data(format!("Invalid status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(AppError::invalid_data(format!("Invalid payment status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdType {
    Aadhaar,
    Passport,
    #[serde(rename = "Driving License")]
    DrivingLicense,
    #[serde(rename = "Voter ID")]
    VoterId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdProofStatus {
    Pending,
    Submitted,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdProof {
    pub id_type: IdType,
    #[serde(default)]
    pub front_image: String,
    #[serde(default)]
    pub back_image: String,
    pub status: IdProofStatus,
    #[serde(
        default,
        with = "datetime::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "datetime::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub verified_at: Option<DateTime<Utc>>,
}

impl IdProof {
    pub fn has_images(&self) -> bool {
        !self.front_image.is_empty()
    }
}

// Database model for the bookings collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub hotel_id: ObjectId,

    // Guest contact snapshot
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    // Stay
    #[serde(with = "serde_helpers::chrono_datetime_as_bson_datetime")]
    pub check_in: DateTime<Utc>,
    #[serde(with = "serde_helpers::chrono_datetime_as_bson_datetime")]
    pub check_out: DateTime<Utc>,
    #[serde(default)]
    pub adult_count: i32,
    #[serde(default)]
    pub child_count: i32,
    #[serde(deserialize_with = "deserialize_f64")]
    pub total_cost: f64,

    pub status: BookingStatus,

    // Payment
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_amount: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_proof: Option<IdProof>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_requests: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,

    #[serde(with = "serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

// PATCH /:id/status
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: String,
    #[validate(length(max = 500))]
    pub cancellation_reason: Option<String>,
    #[validate(range(min = 0.0))]
    pub refund_amount: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyAction {
    Approve,
    Reject,
}

impl FromStr for VerifyAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            other => Err(AppError::invalid_data(format!(
                "Invalid action: {}. Must be 'approve' or 'reject'",
                other
            ))),
        }
    }
}

// PATCH /:id/verify-id
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyIdRequest {
    pub action: String,
    #[validate(length(max = 500))]
    pub rejection_reason: Option<String>,
}

// PATCH /:id/id-proof
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitIdProofRequest {
    pub id_type: IdType,
    #[validate(url)]
    pub front_image: String,
    #[validate(url)]
    pub back_image: Option<String>,
}

// PATCH /:id/payment
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentRequest {
    pub payment_status: String,
    #[validate(length(min = 1, max = 100))]
    pub payment_method: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdProofResponse {
    pub id_type: IdType,
    pub front_image: String,
    pub back_image: String,
    pub status: IdProofStatus,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
}

// Model for booking response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub hotel_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub check_in: DateTime<Utc>,
    pub check_out: DateTime<Utc>,
    pub adult_count: i32,
    pub child_count: i32,
    pub total_cost: f64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
    pub refund_amount: Option<f64>,
    pub id_proof: Option<IdProofResponse>,
    pub special_requests: Option<String>,
    pub cancellation_reason: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<IdProof> for IdProofResponse {
    fn from(proof: IdProof) -> Self {
        IdProofResponse {
            id_type: proof.id_type,
            front_image: proof.front_image,
            back_image: proof.back_image,
            status: proof.status,
            uploaded_at: proof.uploaded_at,
            verified_at: proof.verified_at,
        }
    }
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        BookingResponse {
            id: booking.id.to_hex(),
            user_id: booking.user_id.to_hex(),
            hotel_id: booking.hotel_id.to_hex(),
            first_name: booking.first_name,
            last_name: booking.last_name,
            email: booking.email,
            phone: booking.phone,
            check_in: booking.check_in,
            check_out: booking.check_out,
            adult_count: booking.adult_count,
            child_count: booking.child_count,
            total_cost: booking.total_cost,
            status: booking.status,
            payment_status: booking.payment_status,
            payment_method: booking.payment_method,
            refund_amount: booking.refund_amount,
            id_proof: booking.id_proof.map(IdProofResponse::from),
            special_requests: booking.special_requests,
            cancellation_reason: booking.cancellation_reason,
            rejection_reason: booking.rejection_reason,
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}

// Success response model
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

// Older documents stored totalCost as an integer
fn deserialize_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrFloat {
        Int(i64),
        Float(f64),
    }

    match IntOrFloat::deserialize(deserializer)? {
        IntOrFloat::Int(i) => Ok(i as f64),
        IntOrFloat::Float(f) => Ok(f),
    }
}
