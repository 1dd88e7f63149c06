//! Vehicle storage search.
//!
//! Finds, for every location in a listings catalog, the cheapest set of
//! storage listings that can hold a requested group of vehicles, and serves
//! the ranked offers over HTTP.

pub mod api;
pub mod catalog;
pub mod config;
pub mod geometry;
pub mod model;
pub mod monitor;
pub mod optimizer;
pub mod types;
