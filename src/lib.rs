//! Hierarchical task trees with drag-and-drop reordering, kept in sync
//! across devices through a shared document store.

pub mod cli;
pub mod io;
pub mod model;
pub mod ops;
pub mod session;
pub mod sync;
