use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::Error;

/// Maximum size of a single chunk produced by `read_chunks`
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Drain `stream` into a buffer of exactly `declared_size` bytes.
///
/// Chunks are copied in arrival order. The stream must carry exactly the
/// declared number of bytes: overflowing the buffer or ending short both
/// fail with `Error::DataIntegrity`. A declared size that cannot be
/// allocated fails with `Error::Allocation`.
pub async fn drain<S, B, E>(stream: S, declared_size: usize) -> Result<Vec<u8>, Error>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    Error: From<E>,
{
    futures::pin_mut!(stream);

    let mut buf = Vec::new();
    buf.try_reserve_exact(declared_size)
        .map_err(|_| Error::Allocation {
            size: declared_size,
        })?;
    buf.resize(declared_size, 0u8);
    let mut offset = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let chunk = chunk.as_ref();
        let end = offset + chunk.len();

        if end > declared_size {
            return Err(Error::DataIntegrity {
                expected: declared_size,
                actual: end,
            });
        }

        buf[offset..end].copy_from_slice(chunk);
        offset = end;

        log::debug!("Drained {}/{} bytes", offset, declared_size);
    }

    if offset != declared_size {
        return Err(Error::DataIntegrity {
            expected: declared_size,
            actual: offset,
        });
    }

    Ok(buf)
}

/// Turn an async reader into a stream of chunks.
///
/// The stream ends at EOF, or right after yielding a read error.
pub fn read_chunks<R>(reader: R) -> impl Stream<Item = std::io::Result<Bytes>>
where
    R: AsyncRead + Unpin,
{
    stream::unfold(Some(reader), |reader| async move {
        let mut reader = reader?;
        let mut buf = vec![0u8; CHUNK_SIZE];

        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some(reader)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}
