use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use wayfinder_core::WayfinderError;

/// A boxed stream of byte chunks, the common currency between retrieval and
/// verification layers.
pub type ByteStream = std::pin::Pin<Box<dyn Stream<Item = Result<Bytes, WayfinderError>> + Send>>;

/// Per-branch bounded queue depth. At typical `reqwest` chunk sizes this
/// keeps outstanding buffered data in the tens-of-KiB range per branch.
const CHANNEL_CAPACITY: usize = 64;

/// Splits one byte stream into `branches` independent streams that each see
/// the exact same bytes in the exact same order. Each branch has its own
/// bounded channel, so a slow consumer on one branch applies backpressure to
/// the producer without forcing the other branches (or the upstream fetch)
/// to buffer unboundedly. If every branch is dropped, the producer task
/// stops pulling from `source` and exits.
pub fn tee(mut source: ByteStream, branches: usize) -> Vec<ByteStream> {
    assert!(branches >= 1, "tee requires at least one branch");

    let mut senders = Vec::with_capacity(branches);
    let mut outputs = Vec::with_capacity(branches);
    for _ in 0..branches {
        let (tx, rx) = mpsc::channel::<Result<Bytes, WayfinderError>>(CHANNEL_CAPACITY);
        senders.push(tx);
        outputs.push(Box::pin(ReceiverStream::new(rx)) as ByteStream);
    }

    tokio::spawn(async move {
        let mut alive = vec![true; senders.len()];
        'outer: while let Some(item) = source.next().await {
            if alive.iter().all(|a| !a) {
                break;
            }
            match item {
                Ok(bytes) => {
                    for (tx, alive) in senders.iter().zip(alive.iter_mut()) {
                        if !*alive {
                            continue;
                        }
                        if tx.send(Ok(bytes.clone())).await.is_err() {
                            *alive = false;
                        }
                    }
                }
                Err(e) => {
                    let msg = e.to_string();
                    for (tx, alive) in senders.iter().zip(alive.iter_mut()) {
                        if !*alive {
                            continue;
                        }
                        let _ = tx
                            .send(Err(WayfinderError::RetrievalFailed(msg.clone())))
                            .await;
                        *alive = false;
                    }
                    break 'outer;
                }
            }
        }
    });

    outputs
}
