pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod github;
pub mod library;
pub mod logger;
pub mod proxy;
pub mod scanner;
