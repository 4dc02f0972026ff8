//! Metadata models
//!
//! This module contains the data types exchanged with providers:
//! - `types` - Type aliases for common identifiers (ProviderId)
//! - `field` - The recognised bibliographic fields (Field)
//! - `fields` - A nullable field set (VolumeFields)
//! - `result` - One provider call's output (ProviderResult)
//! - `priority` - Interactive vs background work (Priority)

mod field;
mod fields;
mod priority;
mod result;
mod types;

pub use field::Field;
pub use fields::VolumeFields;
pub use priority::Priority;
pub use result::ProviderResult;
pub use types::ProviderId;
