//! IPC server for front-end communication

pub mod protocol;
pub mod server;

pub use server::IpcServer;
