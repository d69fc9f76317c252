//! Add-in service: command protocol, dispatch, periodic timers and the loop
//! that ties them to the message queue.
//!
//! CHANGELOG:
//! - 10/12/2026 - Initial module structure

pub mod protocol;
pub mod scheduler;
pub mod server;
pub mod service;
