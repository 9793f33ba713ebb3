pub mod error;
pub mod config;
pub mod labels;
pub mod preprocessing;
pub mod classifier;
pub mod registry;
pub mod analysis;
pub mod suggestions;
pub mod interface;
