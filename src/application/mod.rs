//! Application layer: wires the pure domain kernel to I/O collaborators
//! (spec §4.5 Session Manager, §4.6 Stream Clients, §4.7 Daemon Loop).

pub mod action_executor;
pub mod daemon;
pub mod session_manager;
pub mod stream_clients;

pub use daemon::Daemon;
pub use session_manager::SessionManager;
