//! CLI command implementations.

pub mod check;
pub mod registry;
pub mod resolve;
pub mod serve;

pub use check::check;
pub use registry::registry;
pub use resolve::resolve;
pub use serve::serve;
