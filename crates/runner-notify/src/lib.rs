pub mod error;
pub mod mapper;
pub mod signature;
pub mod sink;
pub mod types;

pub use error::*;
pub use mapper::*;
pub use signature::*;
pub use sink::*;
pub use types::*;
