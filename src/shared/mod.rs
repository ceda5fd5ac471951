pub mod actor;
pub mod state;
pub mod utils;
