pub mod common;
pub mod config;
pub mod downloader;
pub mod queue;
