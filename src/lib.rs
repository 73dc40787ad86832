//! Marble chain scene
//!
//! A layered 3D scene built around a closed ring of refractive marbles:
//!
//! - **Capture pipeline**: auxiliary cameras render the animated target
//!   layer, the marble back faces and the environment into persistent
//!   textures every frame; the refraction material samples all three.
//! - **Postprocessing**: the main render goes through a fixed effect chain
//!   (antialiasing, two ambient occlusion passes, bloom) while the captured
//!   layers get their own lightweight stacks (distortion, gamma).
//! - **Physics**: the marbles are rigid spheres joined head-to-tail by
//!   point-to-point constraints into a closed ring that can be grabbed and
//!   dragged with the pointer.
//!
//! Rendering goes through the [`backend::GraphicsBackend`] trait;
//! [`backend::HeadlessBackend`] records work for tests and the optional
//! `wgpu-backend` feature provides a GPU implementation.
//!
//! # Example
//!
//! ```
//! use marble_scene::{backend::HeadlessBackend, MarbleApp, SceneConfig};
//!
//! let mut app = MarbleApp::new(HeadlessBackend::new(), SceneConfig::default()).unwrap();
//! app.frame(1.0 / 60.0).unwrap();
//! ```

pub use glam;
pub use rapier3d;

pub mod app;
pub mod backend;
pub mod composer;
pub mod error;
pub mod physics;
pub mod resources;
pub mod scene;
pub mod scheduler;

pub use app::{MarbleApp, SceneConfig};
pub use error::{SceneError, SceneResult};
