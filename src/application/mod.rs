pub mod asset_cache;
pub mod benchmark;
pub mod dispatcher;
pub mod graph_cache;
pub mod routing_service;

pub use asset_cache::*;
pub use benchmark::*;
pub use dispatcher::*;
pub use graph_cache::*;
pub use routing_service::*;
