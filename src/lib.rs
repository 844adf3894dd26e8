//! Promotion elasticity learning and promotion recommendation for retail
//! sales histories.

pub mod config;
pub mod engine;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod storage;
pub mod utils;
