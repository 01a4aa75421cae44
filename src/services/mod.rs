//! Business logic services

pub mod dispatch;
pub mod geo;
pub mod hos;
pub mod insertion;
pub mod normalize;
pub mod pricing;
pub mod routing;
pub mod run_planner;
pub mod run_store;
pub mod schedule;
