pub mod backup;
pub mod ckan;
pub mod config;
pub mod domain;
pub mod error;
pub mod naming;
pub mod output;
