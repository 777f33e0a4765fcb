// Crate root library declaration and module exports.
pub mod archive;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod provision;
pub mod reconciler;
pub mod repository;
pub mod storage;
pub mod store;
pub mod triggers;
