use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::debug;

pub const BUFFER_SIZE: usize = 8192;

/// Capacity of the hand-off channel between a reader task and its consumer.
const CHANNEL_CAPACITY: usize = 1;

/// Bytes from one successful read, copied out of the reader's scratch buffer.
pub type Chunk = Vec<u8>;

#[derive(Debug, PartialEq, Eq)]
pub enum ReadEvent {
    Data(Chunk),
    /// Published once, on clean close or on any read error.
    End,
}

/// Republishes everything read from one connection as a sequence of owned chunks.
///
/// The read loop runs in its own task. Dropping the `ChunkReader` aborts that
/// task, which releases the reader it owns even when it is parked on a read.
pub struct ChunkReader {
    rx: mpsc::Receiver<ReadEvent>,
    task: JoinHandle<()>,
}

impl ChunkReader {
    pub fn spawn<R>(mut reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let task = tokio::spawn(async move {
            let mut buffer = [0u8; BUFFER_SIZE];

            loop {
                let event = match reader.read(&mut buffer).await {
                    Ok(0) => {
                        debug!("Stream closed by peer");
                        ReadEvent::End
                    }
                    Ok(n) => ReadEvent::Data(buffer[..n].to_vec()),
                    Err(e) => {
                        debug!(error = %e, "Read failed, ending stream");
                        ReadEvent::End
                    }
                };

                let ended = matches!(event, ReadEvent::End);
                if tx.send(event).await.is_err() || ended {
                    break;
                }
            }
        });

        Self { rx, task }
    }

    /// Waits for the next event. Cancel-safe, so it can sit in a `select!` arm.
    pub async fn next(&mut self) -> ReadEvent {
        self.rx.recv().await.unwrap_or(ReadEvent::End)
    }
}

impl Drop for ChunkReader {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io, time::Duration};
    use tokio::{io::AsyncWriteExt, time::timeout};
    use tokio_test::io::Builder;

    const TEST_TIMEOUT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn publishes_one_chunk_per_read() {
        let mock = Builder::new().read(b"hello").read(b"world").build();
        let mut reader = ChunkReader::spawn(mock);

        assert_eq!(reader.next().await, ReadEvent::Data(b"hello".to_vec()));
        assert_eq!(reader.next().await, ReadEvent::Data(b"world".to_vec()));
        assert_eq!(reader.next().await, ReadEvent::End);
    }

    #[tokio::test]
    async fn read_error_ends_stream_exactly_once() {
        let mock = Builder::new()
            .read(b"partial")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut reader = ChunkReader::spawn(mock);

        assert_eq!(reader.next().await, ReadEvent::Data(b"partial".to_vec()));
        assert_eq!(reader.next().await, ReadEvent::End);

        // The task has exited, so the channel is closed rather than holding a second End
        assert!(reader.rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn splits_reads_larger_than_buffer() {
        let payload = vec![0x5A; BUFFER_SIZE + 100];
        let mock = Builder::new().read(&payload).build();
        let mut reader = ChunkReader::spawn(mock);

        let ReadEvent::Data(first) = reader.next().await else {
            panic!("expected data");
        };
        let ReadEvent::Data(second) = reader.next().await else {
            panic!("expected data");
        };
        assert_eq!(first.len(), BUFFER_SIZE);
        assert_eq!(second.len(), 100);
        assert_eq!(reader.next().await, ReadEvent::End);
    }

    #[tokio::test]
    async fn chunks_do_not_alias_scratch_buffer() {
        let (near, mut far) = tokio::io::duplex(64);
        let mut reader = ChunkReader::spawn(near);

        far.write_all(b"first").await.unwrap();
        let first = reader.next().await;
        far.write_all(b"XXXXX").await.unwrap();
        let second = reader.next().await;

        assert_eq!(first, ReadEvent::Data(b"first".to_vec()));
        assert_eq!(second, ReadEvent::Data(b"XXXXX".to_vec()));
    }

    #[tokio::test]
    async fn dropping_reader_releases_idle_connection() {
        let (near, mut far) = tokio::io::duplex(64);
        let reader = ChunkReader::spawn(near);

        drop(reader);

        let mut buffer = [0u8; 8];
        let result = timeout(TEST_TIMEOUT, far.read(&mut buffer))
            .await
            .expect("peer should observe close after reader is dropped");
        assert!(matches!(result, Ok(0) | Err(_)));
    }
}
