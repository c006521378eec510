pub mod aggregate;
pub mod codec;
pub mod graph;
pub mod ports;
pub mod registry;
pub mod types;

pub use aggregate::*;
pub use codec::*;
pub use graph::*;
pub use ports::*;
pub use registry::*;
pub use types::*;
