pub mod api;
pub mod captions;
pub mod config;
pub mod edit;
pub mod error;
pub mod ffmpeg;
pub mod generate;
pub mod logging;
pub mod prepare;
pub mod publish;
pub mod reformat;
pub mod retry;
pub mod rows;
pub mod storage;
pub mod themes;
pub mod unsubscribe;
