//! Command line around the disposable test environment.
pub mod cli;
pub mod log;
pub mod ux;
