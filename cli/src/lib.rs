//! weaver-cli library, exposing modules for unit tests.

pub mod commands;
pub mod error;
pub mod logging;
pub mod plan_file;
