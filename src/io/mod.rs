//! Generic I/O layer: transport and process management
//!
//! Nothing in this module knows about the engine command protocol; it moves
//! lines and supervises the child process.

pub mod process;
pub mod transport;

pub use process::{
    ChildProcessManager, ProcessError, ProcessExitEvent, ProcessExitHandler, ProcessManager,
    ProcessState, StderrMonitor, StopMode,
};
pub use transport::{MockTransport, MockTransportHandle, StdioTransport, Transport};
