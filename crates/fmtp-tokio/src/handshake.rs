//! The identification exchange that turns an accepted byte stream into an
//! FMTP connection.
//!
//! Both roles run under the Ti timer: the initiator sends its
//! identification and validates the one it gets back, the responder
//! validates first and echoes its own. Every receive step that overruns Ti
//! fails the whole attempt with `ConnectionDeadlineExceeded`.

use std::time::Duration;

use fmtp_core::{FmtpError, FmtpIdentifier, FmtpPacket, FmtpType, IdRequest, IdResponse};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _};
use tokio::time::timeout;
use tracing::debug;

use crate::framer::read_packet;

fn expect_identification(packet: &FmtpPacket) -> Result<(), FmtpError> {
    let typ = packet.header.typ();
    if typ != FmtpType::Identification {
        return Err(FmtpError::ProtocolViolation(format!(
            "expected an identification message, got {typ}"
        )));
    }
    Ok(())
}

/// Runs the initiator side of the identification exchange.
///
/// Sends `local-remote`, validates the peer's echoed identification against
/// the expected endpoints and answers with ACCEPT or REJECT.
pub(crate) async fn initiate<S>(
    stream: &mut S,
    local: &FmtpIdentifier,
    remote: &FmtpIdentifier,
    ti: Duration,
) -> Result<(), FmtpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!(%local, %remote, "initiating identification exchange");
    stream
        .write_all(&FmtpPacket::id_request(local, remote).into_bytes())
        .await?;

    // the reply and our response both happen under Ti
    let accepted = timeout(ti, async {
        let reply = read_packet(stream).await?;
        expect_identification(&reply)?;
        let request = IdRequest::decode(reply.body())?;

        // the peer names itself first: sender must be our remote
        let accepted = request.matches(remote, local);
        let response = if accepted {
            FmtpPacket::accept()
        } else {
            FmtpPacket::reject()
        };
        stream.write_all(&response.into_bytes()).await?;
        Ok::<_, FmtpError>(accepted)
    })
    .await
    .map_err(|_| FmtpError::ConnectionDeadlineExceeded)??;

    if !accepted {
        return Err(FmtpError::RejectedByLocal);
    }
    debug!(%remote, "identification exchange complete");
    Ok(())
}

/// Runs the responder side of the identification exchange on an accepted
/// byte stream.
///
/// The peer is admitted if `accept_remote` approves its identifier; the
/// responder then echoes `local-remote` and waits, under a refreshed Ti,
/// for the peer's ACCEPT. Returns the peer's identifier.
pub(crate) async fn respond<S, F>(
    stream: &mut S,
    local: &FmtpIdentifier,
    ti: Duration,
    accept_remote: F,
) -> Result<FmtpIdentifier, FmtpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: Fn(&FmtpIdentifier) -> bool,
{
    let request_packet = timeout(ti, read_packet(stream))
        .await
        .map_err(|_| FmtpError::ConnectionDeadlineExceeded)??;
    expect_identification(&request_packet)?;
    let request = IdRequest::decode(request_packet.body())?;

    if !accept_remote(&request.sender) {
        debug!(remote = %request.sender, "rejecting peer");
        stream
            .write_all(&FmtpPacket::reject().into_bytes())
            .await?;
        return Err(FmtpError::RejectedByLocal);
    }

    let remote = request.sender;
    stream
        .write_all(&FmtpPacket::id_request(local, &remote).into_bytes())
        .await?;

    // Ti restarts for the response leg
    let response_packet = timeout(ti, read_packet(stream))
        .await
        .map_err(|_| FmtpError::ConnectionDeadlineExceeded)??;
    expect_identification(&response_packet)?;
    if !IdResponse::decode(response_packet.body())?.accepted {
        return Err(FmtpError::RejectedByRemote);
    }

    debug!(%remote, "identification exchange complete");
    Ok(remote)
}
