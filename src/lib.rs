pub mod api;
pub mod config;
pub mod http_client;
pub mod input;
pub mod network_client;
pub mod render;
pub mod services;
pub mod status;
pub mod transport;
pub mod ui;
