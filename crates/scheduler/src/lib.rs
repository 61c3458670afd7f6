//! Load-aware scheduler host
//!
//! Loads cluster state, drives the scheduling plugins and serves the
//! scheduling, health and metrics API.

pub mod api;
pub mod config;
pub mod cycle;
pub mod inventory;
