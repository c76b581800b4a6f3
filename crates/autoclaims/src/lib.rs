pub mod agents;
pub mod chat;
pub mod config;
pub mod context;
pub mod errors;
pub mod functions;
pub mod key_manager;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod resources;
pub mod runner;
pub mod tools;
