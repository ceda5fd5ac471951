//! Minimal contact/company/activity store consumed by prospect conversion
//! and audience resolution. Full CRUD for these entities lives elsewhere.

mod migration;
mod service;
mod types;

pub use migration::*;
pub use service::*;
pub use types::*;
