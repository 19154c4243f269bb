pub mod auth;
pub mod config;
pub mod error;
pub mod notify;
pub mod profiles;
pub mod state;
pub mod vouchers;
pub mod web;
