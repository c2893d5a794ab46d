pub mod clients;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod init;
pub mod logger;
pub mod queue;
pub mod reconcile;
pub mod stats;
pub mod store;

pub use domain::Domain;
pub use error::{Error, Result};
