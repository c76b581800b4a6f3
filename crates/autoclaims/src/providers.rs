pub mod base;
pub mod configs;
pub mod databricks;
pub mod factory;
pub mod openai;
pub mod utils;

#[cfg(test)]
pub mod mock;
