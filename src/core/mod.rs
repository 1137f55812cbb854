pub mod errors;
pub mod locking;
