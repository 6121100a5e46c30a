//! # CFS control-plane library
//!
//! Core functionality for the Configuration Framework Service control plane.
//! `bin/main.rs` wires these modules into the actix-web server.

pub mod api;
pub mod collab;
pub mod component;
pub mod configuration;
pub mod event;
pub mod health;
pub mod kv;
pub mod migration;
pub mod model;
pub mod options;
pub mod reconciler;
pub mod schema;
pub mod session;
pub mod source;
pub mod source_resolver;
pub mod tenancy;
