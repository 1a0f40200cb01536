//! Featuregate - order and payment lifecycle engine for digital feature sales
//!
//! This library provides the core functionality for the Featuregate commerce
//! backend, including database operations, gateway integrations, the payment
//! state transition engine and API handlers.

pub mod audit;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod gateways;
pub mod handlers;
pub mod id;
pub mod models;
