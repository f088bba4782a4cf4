use crate::Error;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the big-endian length prefix of every frame.
const PREFIX_LENGTH: usize = 4;

/// Sends data to the sink with a 4-byte length prefix.
/// Returns an error if the message is too large or the stream is closed.
pub async fn send_frame<S: AsyncWrite + Unpin>(
    sink: &mut S,
    buf: &[u8],
    max_message_size: usize,
) -> Result<(), Error> {
    // Validate frame size
    let n = buf.len();
    if n == 0 {
        return Err(Error::SendZeroSize);
    }
    if n > max_message_size {
        return Err(Error::SendTooLarge(n));
    }
    let len: u32 = n.try_into().map_err(|_| Error::SendTooLarge(n))?;

    // Write prefix and payload together so a frame is never split across writes
    let mut frame = BytesMut::with_capacity(PREFIX_LENGTH + n);
    frame.put_u32(len);
    frame.put_slice(buf);
    sink.write_all(&frame).await.map_err(Error::SendFailed)?;
    sink.flush().await.map_err(Error::SendFailed)?;
    Ok(())
}

/// Receives data from the stream with a 4-byte length prefix into `buf`,
/// returning the number of bytes read.
///
/// The length of `buf` is the maximum accepted frame size. The stream ending
/// cleanly before a new frame begins is reported as [Error::Closed].
pub async fn recv_frame<T: AsyncRead + Unpin>(stream: &mut T, buf: &mut [u8]) -> Result<usize, Error> {
    // Read the first 4 bytes to get the length of the message
    let mut prefix = [0u8; PREFIX_LENGTH];
    let mut filled = 0;
    while filled < PREFIX_LENGTH {
        let n = stream
            .read(&mut prefix[filled..])
            .await
            .map_err(Error::RecvFailed)?;
        if n == 0 {
            if filled == 0 {
                return Err(Error::Closed);
            }
            return Err(Error::RecvFailed(std::io::ErrorKind::UnexpectedEof.into()));
        }
        filled += n;
    }

    // Validate frame size
    let len = u32::from_be_bytes(prefix) as usize;
    if len == 0 {
        return Err(Error::RecvZeroSize);
    }
    if len > buf.len() {
        return Err(Error::RecvTooLarge(len));
    }

    // Read the rest of the message
    stream
        .read_exact(&mut buf[..len])
        .await
        .map_err(Error::RecvFailed)?;
    Ok(len)
}
