//! Furniture marketplace backend: accounts, listings and their approval workflow.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod listings;
pub mod policy;
pub mod state;
pub mod store;
pub mod users;
