pub mod chunked;
pub mod contiguous;

pub use chunked::ChunkedDataRetrieval;
pub use contiguous::ContiguousDataRetrieval;
