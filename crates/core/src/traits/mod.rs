pub mod repository;
pub mod rpc;

pub use repository::*;
pub use rpc::*;
