//! Asset and material management

mod material;
mod texture;

pub use material::*;
pub use texture::*;
