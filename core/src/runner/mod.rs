mod control;
mod events;
pub mod io_pump;
mod runtime;
pub mod stall;
mod traits;
pub mod types;

pub use control::spawn_control_writer;
pub use events::{AgentEvent, ControlMessage};
pub use runtime::{Supervisor, SupervisorSettings};
pub use traits::{AgentInvoker, ProcessHandle};
pub use types::{
    AgentExit, AgentRequest, AgentSession, HangReport, ProcessTarget, Signal, StallKind,
    StallReport, SupervisedRun, EXIT_CANCELLED, EXIT_STALLED, EXIT_TIMEOUT,
};
