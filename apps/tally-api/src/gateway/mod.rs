pub mod hub;
pub mod server;
