pub mod cache;
pub mod network_provider;
pub mod persistent_cache;
pub mod static_provider;

pub use cache::CachedGatewaysProvider;
pub use network_provider::NetworkGatewaysProvider;
pub use persistent_cache::{InMemoryKv, PersistentCachedGatewaysProvider, PersistentKv};
pub use static_provider::StaticGatewaysProvider;
