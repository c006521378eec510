pub mod console_logger;
pub mod file_graph_store;
pub mod file_logger;
pub mod http_asset_fetcher;
pub mod map_renderer;
pub mod multi_logger;
pub mod noop_logger;
pub mod osm_resolver;
pub mod process_engine;

pub use console_logger::*;
pub use file_graph_store::*;
pub use file_logger::*;
pub use http_asset_fetcher::*;
pub use map_renderer::*;
pub use multi_logger::*;
pub use noop_logger::*;
pub use osm_resolver::*;
pub use process_engine::*;
