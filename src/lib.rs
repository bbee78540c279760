pub mod alignment;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod error;
pub mod exercise;
pub mod logging;
pub mod pose;
pub mod protocol;
pub mod reference;
pub mod render;
pub mod server;
pub mod session;
pub mod worker;
