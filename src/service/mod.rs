//! Service mode: command socket and request execution.

pub mod protocol;
pub mod server;

pub use protocol::{encode_frame, Request};
pub use server::{serve, run_request, CommandServer};
