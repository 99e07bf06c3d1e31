//! Chunk transport
//!
//! A transport opens a stream of raw chunks for a track. Chunks carry dense
//! `frame_id`s starting at 0 and the end of the stream (`None`) is the
//! "stream ended" signal. Firing the cancel token ends the stream promptly.

use crate::error::{Error, Result};
use crate::playback::types::{Chunk, Track};
use futures::stream::{BoxStream, StreamExt};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Stream of chunks for one track
pub type ChunkStream = BoxStream<'static, Result<Chunk>>;

/// Opens chunk streams (mockable for tests)
#[async_trait::async_trait]
pub trait ChunkTransport: Send + Sync {
    async fn open(&self, track: &Track, cancel: CancellationToken) -> Result<ChunkStream>;
}

/// Serves a local file in fixed-size slices
#[derive(Debug, Clone)]
pub struct FileChunkTransport {
    chunk_size: usize,
}

impl FileChunkTransport {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Fill `buf` unless the file ends first; returns bytes read
async fn read_full(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[async_trait::async_trait]
impl ChunkTransport for FileChunkTransport {
    async fn open(&self, track: &Track, cancel: CancellationToken) -> Result<ChunkStream> {
        let locator = track.locator.clone();
        let mut file = File::open(&locator).await.map_err(|e| {
            Error::TransportFailure(format!("Failed to open {}: {}", locator, e))
        })?;

        debug!(
            "Opened chunk stream for {} ({} byte chunks)",
            locator, self.chunk_size
        );

        let chunk_size = self.chunk_size;
        let stream = async_stream::stream! {
            let mut frame_id = 0u64;

            loop {
                let mut buf = vec![0u8; chunk_size];
                let read = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("Chunk stream for {} cancelled after {} chunks", locator, frame_id);
                        break;
                    }
                    read = read_full(&mut file, &mut buf) => read,
                };

                match read {
                    Ok(0) => break,
                    Ok(n) => {
                        buf.truncate(n);
                        yield Ok(Chunk { frame_id, data: buf });
                        frame_id += 1;
                        if n < chunk_size {
                            break;
                        }
                    }
                    Err(e) => {
                        yield Err(Error::TransportFailure(format!(
                            "Read failed on {} at chunk {}: {}",
                            locator, frame_id, e
                        )));
                        break;
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}
