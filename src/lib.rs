pub mod app;
pub mod cli;
pub mod config;
pub mod controller;
pub mod overlay;
pub mod repository;
pub mod search;
pub mod storage;

pub use app::App;
pub use config::{AppConfig, ConfigLoader, ConfigPaths};
