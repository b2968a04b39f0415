// ABOUTME: Library root for hostbased - SSH hostbased authentication via ssh-keysign.
// ABOUTME: The main binary is in main.rs.

pub mod auth;
pub mod config;
pub mod error;
pub mod helper;
pub mod identity;
pub mod ssh;
pub mod transport;
pub mod wire;
