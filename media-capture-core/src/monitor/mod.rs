pub mod level_monitor;
