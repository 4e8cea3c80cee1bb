pub mod errors;
pub mod models;
pub mod ports;
pub mod reset_tokens;
pub mod service;
