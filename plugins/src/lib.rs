//! Concrete adapters for `weaver-core`: the code-CLI agent invoker, the git
//! `Vcs`, the agent stream parser and the progress printers.

pub mod factory;
pub mod progress;
pub mod runner;
pub mod stream;
pub mod vcs;
