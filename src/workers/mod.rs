pub mod local;
pub mod remote;
pub mod response;
pub mod tool_client;
pub mod tool_executor;
pub mod worker;

pub use local::*;
pub use remote::*;
pub use tool_client::*;
pub use tool_executor::*;
pub use worker::*;
