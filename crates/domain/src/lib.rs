//! Domain-level building blocks for the sponsorship checkout and
//! payment-ledger core: data model, money math, configuration, storage and
//! processor contracts, and the orchestration services that tie them
//! together. The API and storage crates depend on this crate, never the
//! other way around.

pub mod config;
pub mod error;
pub mod model;
pub mod money;
pub mod processor;
pub mod services;
pub mod storage;
