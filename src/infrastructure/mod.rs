pub mod api_key_store;
pub mod audio_output;
pub mod config;
pub mod daily_log_repository;
pub mod durable_store;
pub mod error;
pub mod generation_client;
pub mod hour_signal;
pub mod notifier;
