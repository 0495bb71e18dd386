//! Configuration for the Nd database.

mod database;

pub use database::NdConfig;
