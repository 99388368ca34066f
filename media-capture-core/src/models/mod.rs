pub mod config;
pub mod device;
pub mod error;
pub mod recording_result;
pub mod sample;
pub mod session;
pub mod state;
