//! x11qd - a standalone X11 display server core
//!
//! Clients connect over TCP or a Unix socket and speak the core X11 wire
//! protocol. Their windows live in one tree, are composited in software into
//! a single framebuffer and shown through a pluggable [`backend::Backend`].
//! Pointer and keyboard input from the backend is routed back to clients
//! through grabs, focus and event propagation.

pub mod atom;
pub mod backend;
pub mod client;
pub mod compositor;
pub mod config;
pub mod devices;
pub mod drawable;
pub mod error;
pub mod events;
pub mod font;
pub mod graphics;
pub mod input;
pub mod manage;
pub mod object;
pub mod proto;
pub mod raster;
pub mod rect;
pub mod requests;
pub mod ringbuf;
pub mod server;
pub mod window;
