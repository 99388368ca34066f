pub mod level_meter;
pub mod ring_buffer;
