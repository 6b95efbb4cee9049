use crate::tee::ByteStream;
use futures_util::stream::StreamExt;

/// Wraps a byte stream so every chunk also invokes `on_progress(processed,
/// total)` with a monotonically increasing `processed` count. `total` is
/// whatever the caller knew up front (e.g. a `content-length` header) and is
/// passed through unchanged; `0` means unknown.
pub fn with_progress<F>(stream: ByteStream, total: u64, mut on_progress: F) -> ByteStream
where
    F: FnMut(u64, u64) + Send + 'static,
{
    let mut processed: u64 = 0;
    Box::pin(stream.map(move |item| {
        if let Ok(chunk) = &item {
            processed += chunk.len() as u64;
            on_progress(processed, total);
        }
        item
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::TryStreamExt;
    use std::sync::{Arc, Mutex};
    use wayfinder_core::WayfinderError;

    #[tokio::test]
    async fn progress_increases_monotonically_and_matches_final_total() {
        let items: Vec<Result<Bytes, WayfinderError>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"de")),
        ];
        let source: ByteStream = Box::pin(futures_util::stream::iter(items));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let wrapped = with_progress(source, 5, move |processed, total| {
            seen2.lock().unwrap().push((processed, total));
        });
        let collected: Vec<Bytes> = wrapped.try_collect().await.unwrap();
        assert_eq!(collected.len(), 2);
        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![(3, 5), (5, 5)]);
    }
}
