//! CLI command implementations.

pub mod build;
pub mod compile;
pub mod registry;

pub use build::build;
pub use compile::compile_file;
pub use registry::show_registry;
