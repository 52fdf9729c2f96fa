pub mod buffer;
pub mod image;
pub mod layout;
pub mod texture;
