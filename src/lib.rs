#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate civic_test;

pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;

pub use app::App;
pub use config::Config;
