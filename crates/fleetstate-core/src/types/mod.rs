//! Type system utilities and aliases.
//!
//! This module provides type aliases and handle types commonly used
//! throughout the workspace.
//!
//! ## Modules
//!
//! - [`aliases`]: Type aliases for `Arc<Mutex<T>>`, event sinks, callbacks
//! - [`handles`]: Opaque tokens returned by `subscribe`-style calls

pub mod aliases;
pub mod handles;

pub use aliases::*;
pub use handles::*;
