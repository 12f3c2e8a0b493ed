//! Admissions core for the UCAES university administration suite.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
