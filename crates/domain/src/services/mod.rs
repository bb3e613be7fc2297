//! Orchestration services over the storage and processor contracts, plus
//! telemetry wiring shared by the binaries.

pub mod checkout;
pub mod completion;
pub mod events;
pub mod refund;
pub mod sponsorships;
pub mod telemetry;
pub mod tiers;

#[cfg(test)]
pub(crate) mod testutil;
