pub mod backend;
pub mod completion;
pub mod config;
pub mod document;
pub mod languages;
pub mod models;
pub mod session_cache;
