//! Money math shared by the checkout and tier services: unit conversion,
//! amount bounds, the platform fee schedule, and idempotency key derivation.
//!
//! All stored amounts are integer minor currency units. Conversions from the
//! request surface (decimal major units) round to the nearest cent before any
//! validation so bound checks see exactly what would be charged.

use serde::Deserialize;
use thiserror::Error;

use crate::model::CheckoutId;

/// Inclusive one-time payment bounds, minor units (1..=10000 major).
pub const ONE_TIME_MIN_MINOR: i64 = 100;
pub const ONE_TIME_MAX_MINOR: i64 = 1_000_000;

/// Inclusive custom subscription amount bounds, minor units.
pub const CUSTOM_SUBSCRIPTION_MIN_MINOR: i64 = 100;
pub const CUSTOM_SUBSCRIPTION_MAX_MINOR: i64 = 1_000_000;

pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount must be between {min} and {max} {unit}")]
    OutOfRange {
        min: i64,
        max: i64,
        unit: &'static str,
    },
    #[error("amount is not a representable currency value")]
    NotRepresentable,
}

/// Converts a decimal major-unit amount to minor units, rounding to the
/// nearest cent.
pub fn major_to_minor(amount_major: f64) -> Result<i64, AmountError> {
    if !amount_major.is_finite() || amount_major < 0.0 {
        return Err(AmountError::NotRepresentable);
    }
    let minor = (amount_major * MINOR_UNITS_PER_MAJOR as f64).round();
    if minor > i64::MAX as f64 {
        return Err(AmountError::NotRepresentable);
    }
    Ok(minor as i64)
}

/// Converts minor units to whole major units, truncating the cent remainder.
/// Expedition `raised` aggregates are kept in major units.
pub fn minor_to_major(amount_minor: i64) -> i64 {
    amount_minor / MINOR_UNITS_PER_MAJOR
}

/// Validates a one-time payment amount supplied in decimal major units.
pub fn validate_one_time_amount(amount_major: f64) -> Result<i64, AmountError> {
    let minor = major_to_minor(amount_major)?;
    if !(ONE_TIME_MIN_MINOR..=ONE_TIME_MAX_MINOR).contains(&minor) {
        return Err(AmountError::OutOfRange {
            min: ONE_TIME_MIN_MINOR / MINOR_UNITS_PER_MAJOR,
            max: ONE_TIME_MAX_MINOR / MINOR_UNITS_PER_MAJOR,
            unit: "major currency units",
        });
    }
    Ok(minor)
}

/// Validates a custom subscription amount supplied in decimal major units.
pub fn validate_custom_subscription_amount(amount_major: f64) -> Result<i64, AmountError> {
    let minor = major_to_minor(amount_major)?;
    if !(CUSTOM_SUBSCRIPTION_MIN_MINOR..=CUSTOM_SUBSCRIPTION_MAX_MINOR).contains(&minor) {
        return Err(AmountError::OutOfRange {
            min: CUSTOM_SUBSCRIPTION_MIN_MINOR,
            max: CUSTOM_SUBSCRIPTION_MAX_MINOR,
            unit: "minor currency units",
        });
    }
    Ok(minor)
}

/// Yearly price derived from a monthly price: twelve months with a fixed 10%
/// multi-month discount, rounded half-up to the cent.
pub fn yearly_price_minor(monthly_minor: i64) -> i64 {
    (monthly_minor * 108 + 5) / 10
}

/// Platform fee configuration threaded into each service at construction;
/// never read from ambient global state.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FeeSchedule {
    percent: f64,
}

impl FeeSchedule {
    pub const DEFAULT_PERCENT: f64 = 10.0;

    pub fn new(percent: f64) -> Self {
        Self { percent }
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    /// Platform cut of a charge, rounded to the nearest minor unit.
    pub fn application_fee_minor(&self, amount_minor: i64) -> i64 {
        (amount_minor as f64 * self.percent / 100.0).round() as i64
    }

    /// Gross / fee / net split used for the post-commit receipt.
    pub fn breakdown(&self, amount_minor: i64) -> FeeBreakdown {
        let fee_minor = self.application_fee_minor(amount_minor);
        FeeBreakdown {
            gross_minor: amount_minor,
            fee_minor,
            net_minor: amount_minor - fee_minor,
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PERCENT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub gross_minor: i64,
    pub fee_minor: i64,
    pub net_minor: i64,
}

/// Idempotency key for a one-time payment intent, deterministic per checkout
/// so retried creation calls never double-charge.
pub fn one_time_idempotency_key(checkout: CheckoutId) -> String {
    format!("sponsor_otp_checkout_{checkout}")
}

/// Idempotency key for a subscription creation, deterministic per checkout.
pub fn subscription_idempotency_key(checkout: CheckoutId) -> String {
    format!("sponsor_sub_checkout_{checkout}")
}
