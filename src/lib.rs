pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod fetch;
mod flock;
pub mod generate;
pub mod model;
pub mod proto;
pub mod toolchain;

mod api;
#[cfg(test)]
mod test_support;

pub use api::{Protodex, ProtodexBuilder};
