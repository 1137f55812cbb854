pub mod coordinator;
pub mod events;

pub use coordinator::*;
pub use events::*;
