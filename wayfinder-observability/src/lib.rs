pub mod logging;
pub mod metrics;

pub use logging::init;
pub use metrics::MetricsCollector;
