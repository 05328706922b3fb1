pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod events;
pub mod logging;
pub mod platform;
pub mod settings;
pub mod tasks {
    pub mod loader;
    pub mod viewer;
}

pub use error::{Error, Result};
