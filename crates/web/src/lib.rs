//! Browser UI for faderlink
//!
//! An axum server with one WebSocket endpoint. Browsers see the live audio
//! sources, the control assignments and control positions, and can assign,
//! unassign and move controls.

pub mod context;
pub mod error;
pub mod hub;
pub mod messages;
pub mod server;
pub mod updates;

pub use context::WebContext;
pub use error::{Result, UiError};
pub use server::{router, serve, serve_listener};
pub use updates::{spawn_background, StructuralPoller};
