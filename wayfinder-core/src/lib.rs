pub mod config;
pub mod emitter;
pub mod error;
pub mod gateway;
pub mod limiter;
pub mod traits;
pub mod uri;

pub use config::WayfinderConfig;
pub use emitter::{Emitter, Topic};
pub use error::WayfinderError;
pub use gateway::Gateway;
pub use limiter::Limiter;
pub use traits::{
    DataClassifier, DataRetrievalStrategy, GatewaysProvider, RetrievalRequest, RetrievedResponse,
    RoutingStrategy, SelectGatewayInput, VerificationResult, VerificationStrategy, VerifyInput,
};
pub use uri::{is_tx_id, sandbox_subdomain, Uri};
