pub mod pipeline;
pub mod shader;
