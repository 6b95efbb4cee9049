pub mod composite;
pub mod fastest_ping;
pub mod simple;
pub mod simple_cache;

pub use composite::{Composite, PreferredWithFallback, Ping};
pub use fastest_ping::FastestPing;
pub use simple::{Random, RoundRobin, Static};
pub use simple_cache::SimpleCache;
