pub mod parse;
pub mod planner;

// Re-export all the key structs and functions
pub use parse::*;
pub use planner::*;
