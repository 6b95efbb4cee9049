pub mod client;
pub mod response;

pub use client::{RequestOptions, WayfinderClient, WayfinderClientBuilder};
pub use response::{ManifestResponse, Response, ResolveUrlInput};

pub use wayfinder_core::{Gateway, WayfinderConfig, WayfinderError};
pub use wayfinder_observability::MetricsCollector;
