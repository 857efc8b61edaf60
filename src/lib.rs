pub mod api;
pub mod config;
pub mod database;
pub mod gateway;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod services;
