//! CLI Commands

pub mod check_config;
pub mod extract;
pub mod provision;
pub mod templates;
pub mod wait;
