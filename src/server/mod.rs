mod enrich;
mod filter;
pub mod middleware;
mod router;
pub mod server;

pub use enrich::{ProtocolEnricher, RequestEnricher, RequestMetadata, UserIdentity};
pub use filter::RequestFilter;
pub use middleware::{RequestTaggerLayer, RequestTaggerService};
pub use server::HttpServer;
