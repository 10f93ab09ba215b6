//! Tariff catalogue pipeline: read the official tariff document into a
//! catalogue table, label it, reconcile customs imports against it and
//! materialize the agricultural subset.

pub mod agricultural;
pub mod catalogue;
pub mod code;
pub mod config;
pub mod document;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use store::Store;
