//! Support desk - customer-support ticketing backend

pub mod analytics;
pub mod buffer;
pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod tasks;
