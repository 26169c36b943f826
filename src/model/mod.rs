pub mod node;
pub mod state;
pub mod snapshot;
pub mod config;

pub use node::*;
pub use state::*;
pub use snapshot::*;
pub use config::*;
