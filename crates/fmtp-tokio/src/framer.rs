use fmtp_core::{FmtpError, FmtpPacket, HEADER_LEN, Header};
use tokio::io::{AsyncRead, AsyncReadExt as _};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Bound of the inbound frame queue between the reader task and the
/// supervisor.
const FRAME_QUEUE: usize = 64;

/// Reads exactly one frame from the byte stream: the 5 header bytes, then
/// the body length the header indicates. Never reads past the frame.
pub(crate) async fn read_packet<R>(r: &mut R) -> Result<FmtpPacket, FmtpError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; HEADER_LEN];
    r.read_exact(&mut head).await.map_err(map_eof)?;
    let header = Header::decode(&head)?;

    let mut body = vec![0u8; header.body_len()];
    r.read_exact(&mut body).await.map_err(map_eof)?;
    Ok(FmtpPacket::from_parts(header, body))
}

fn map_eof(e: std::io::Error) -> FmtpError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FmtpError::ShortRead
    } else {
        FmtpError::Io(e)
    }
}

/// Spawns the reader task owning the read half of a connection.
///
/// Decoded frames flow into the first channel, the error that ended the
/// read loop into the second; both channels are bounded so a stalled
/// supervisor backpressures the socket instead of buffering without limit.
pub(crate) fn spawn_reader<R>(
    mut r: R,
) -> (
    mpsc::Receiver<FmtpPacket>,
    mpsc::Receiver<FmtpError>,
    JoinHandle<()>,
)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE);
    let (err_tx, err_rx) = mpsc::channel(1);
    let task = tokio::spawn(async move {
        loop {
            match read_packet(&mut r).await {
                Ok(packet) => {
                    trace!("frame received: {packet}");
                    if frame_tx.send(packet).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = err_tx.send(e).await;
                    return;
                }
            }
        }
    });
    (frame_rx, err_rx, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmtp_core::FmtpType;
    use tokio::io::AsyncWriteExt as _;

    #[tokio::test]
    async fn reads_a_single_frame() {
        let (mut near, mut far) = tokio::io::duplex(1024);
        far.write_all(&[0x02, 0x00, 0x00, 0x0A, 0x02, b'H', b'E', b'L', b'L', b'O'])
            .await
            .unwrap();

        let packet = read_packet(&mut near).await.unwrap();
        assert_eq!(packet.header.typ(), FmtpType::Operator);
        assert_eq!(packet.body(), b"HELLO");
    }

    #[tokio::test]
    async fn short_body_is_a_short_read() {
        let (mut near, mut far) = tokio::io::duplex(1024);
        far.write_all(&[0x02, 0x00, 0x00, 0x0A, 0x02, b'H', b'I'])
            .await
            .unwrap();
        drop(far);

        assert!(matches!(
            read_packet(&mut near).await,
            Err(FmtpError::ShortRead)
        ));
    }

    #[tokio::test]
    async fn malformed_header_is_rejected() {
        let (mut near, mut far) = tokio::io::duplex(1024);
        // indicated length smaller than the header itself
        far.write_all(&[0x02, 0x00, 0x00, 0x02, 0x02]).await.unwrap();

        assert!(matches!(
            read_packet(&mut near).await,
            Err(FmtpError::InvalidHeader(_))
        ));
    }

    #[tokio::test]
    async fn reader_task_forwards_frames_then_the_error() {
        let (near, mut far) = tokio::io::duplex(1024);
        let (mut frames, mut errs, _task) = spawn_reader(near);

        far.write_all(&FmtpPacket::startup().into_bytes())
            .await
            .unwrap();
        let packet = frames.recv().await.unwrap();
        assert_eq!(packet.body(), b"01");

        drop(far);
        assert!(matches!(errs.recv().await, Some(FmtpError::ShortRead)));
    }
}
