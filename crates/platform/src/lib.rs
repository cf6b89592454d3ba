//! Platform layer for the vista editor.
//!
//! This crate provides:
//! - Window management via winit
//! - Input state and the editor key bindings
//! - Raw window handles for surface creation

mod input;
mod window;

pub use input::{EditorAction, InputState, KeyCode, MouseButton};
pub use window::{Window, aspect_ratio};

// Re-export winit types the application loop needs
pub use winit::application::ApplicationHandler;
pub use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
pub use winit::keyboard::PhysicalKey;
pub use winit::window::WindowId;
