pub mod config;
pub mod navigator;
