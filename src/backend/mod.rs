//! GPU backend abstraction
//!
//! The headless backend is always available and backs the test suite; the
//! wgpu backend is enabled by the `wgpu-backend` feature.

pub mod headless;
pub mod traits;
pub mod types;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use headless::HeadlessBackend;
pub use traits::*;
pub use types::*;

#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::WgpuBackend;
