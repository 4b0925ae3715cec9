//! Agent process adapters.

pub mod codecli;
mod process;

pub use codecli::{CodeCliInvoker, CodeCliOptions, ACCESS_RULES_ENV};
pub use process::GroupProcessHandle;
