pub mod chain;
pub mod config;
pub mod index;
pub mod snapshot;
pub mod window;
