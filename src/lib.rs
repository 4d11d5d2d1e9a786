pub mod commands;
pub mod config;
pub mod ffmpeg;
pub mod pipeline;
pub mod server;
pub mod store;
pub mod task;
pub mod transfer;
pub mod truncate;
