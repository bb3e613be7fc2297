//! Wire-format payloads exchanged with the processor API.

use std::collections::HashMap;

use serde::Deserialize;
use trailfund_domain::processor::{
    AccountSnapshot, ChargeSnapshot, IntentStatus, PaymentIntent, Price, SubscriptionHandle,
    TransferSnapshot,
};

#[derive(Debug, Deserialize)]
pub struct CustomerDto {
    pub id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct CustomerListDto {
    #[serde(default)]
    pub data: Vec<CustomerDto>,
}

#[derive(Debug, Deserialize)]
pub struct AccountDto {
    pub id: String,
    #[serde(default)]
    pub charges_enabled: bool,
    #[serde(default)]
    pub payouts_enabled: bool,
    #[serde(default)]
    pub details_submitted: bool,
    #[serde(default)]
    pub requirements: Option<AccountRequirementsDto>,
}

#[derive(Debug, Deserialize, Default)]
pub struct AccountRequirementsDto {
    #[serde(default)]
    pub currently_due: Vec<String>,
}

impl From<AccountDto> for AccountSnapshot {
    fn from(dto: AccountDto) -> Self {
        AccountSnapshot {
            id: dto.id,
            charges_enabled: dto.charges_enabled,
            payouts_enabled: dto.payouts_enabled,
            details_submitted: dto.details_submitted,
            pending_requirements: dto.requirements.unwrap_or_default().currently_due,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductDto {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct PriceDto {
    pub id: String,
    #[serde(default)]
    pub active: bool,
}

impl From<PriceDto> for Price {
    fn from(dto: PriceDto) -> Self {
        Price {
            id: dto.id,
            active: dto.active,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentDto {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub status: IntentStatus,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl From<IntentDto> for PaymentIntent {
    fn from(dto: IntentDto) -> Self {
        PaymentIntent {
            id: dto.id,
            client_secret: dto.client_secret,
            status: dto.status,
            metadata: dto.metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionDto {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub latest_invoice: Option<String>,
}

impl From<SubscriptionDto> for SubscriptionHandle {
    fn from(dto: SubscriptionDto) -> Self {
        SubscriptionHandle {
            id: dto.id,
            latest_invoice_id: dto.latest_invoice,
            status: dto.status,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InvoiceDto {
    #[serde(default)]
    pub payment_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChargeDto {
    pub id: String,
    #[serde(default)]
    pub refunded: bool,
    #[serde(default)]
    pub source_transfer: Option<String>,
}

impl From<ChargeDto> for ChargeSnapshot {
    fn from(dto: ChargeDto) -> Self {
        ChargeSnapshot {
            id: dto.id,
            refunded: dto.refunded,
            source_transfer: dto.source_transfer,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TransferDto {
    pub id: String,
    #[serde(default)]
    pub source_transaction: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl From<TransferDto> for TransferSnapshot {
    fn from(dto: TransferDto) -> Self {
        TransferSnapshot {
            id: dto.id,
            source_transaction: dto.source_transaction,
            metadata: dto.metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefundDto {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDto,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApiErrorDto {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
