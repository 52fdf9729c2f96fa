pub mod barrier;
pub mod command_buffer;
pub mod fence;
