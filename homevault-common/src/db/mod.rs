//! Database initialization shared by HomeVault services

pub mod init;

pub use init::*;
