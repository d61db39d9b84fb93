//! twin-sentry - security telemetry for the Digital Twin portfolio
//!
//! Fronts the application with a request-level filter pipeline and keeps
//! the receipts: every blocked request becomes an attack record (enriched
//! with geolocation in the background), every privileged admin operation
//! leaves an audit trail, and a dashboard API serves both streams live.

pub mod auth;
pub mod config;
pub mod db;
pub mod detector;
pub mod error;
pub mod events;
pub mod geo;
pub mod waf;
pub mod web;
