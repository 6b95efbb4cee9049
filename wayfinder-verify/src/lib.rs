pub mod classifier;
pub mod data_root;
pub mod hash;
pub mod progress;
pub mod remote;
pub mod signature;
pub mod tee;

pub use classifier::GraphqlDataClassifier;
pub use data_root::{compute_data_root, partition_chunks, DataRootVerification, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
pub use hash::HashVerification;
pub use progress::with_progress;
pub use remote::RemoteVerification;
pub use signature::SignatureVerification;
pub use tee::{tee, ByteStream};
