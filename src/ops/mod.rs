pub mod flatten;
pub mod projection;
pub mod tree_ops;
