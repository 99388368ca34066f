pub mod capture_delegate;
pub mod capture_hardware;
pub mod clock;
pub mod device_catalog;
pub mod media_writer;
pub mod permission_gate;
pub mod sample_source;
pub mod screen_backend;
