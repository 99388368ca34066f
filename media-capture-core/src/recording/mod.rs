pub mod pipeline;
pub mod timeline;
