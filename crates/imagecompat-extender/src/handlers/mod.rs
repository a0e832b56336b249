pub mod cache;
pub mod filter;

// Re-export handler functions
pub use cache::*;
pub use filter::*;
