pub mod campaigns;
pub mod config;
pub mod directory;
pub mod merge;
pub mod outbound;
pub mod prospects;
pub mod shared;
