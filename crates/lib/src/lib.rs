//! Parla core library: the translation relay pipeline, its provider adapters,
//! Telegram delivery, and the gateway server used by the CLI.

pub mod channels;
pub mod compose;
pub mod config;
pub mod gateway;
pub mod init;
pub mod pipeline;
pub mod scratch;
pub mod translate;
pub mod tts;
