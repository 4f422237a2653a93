use futures_util::{SinkExt, StreamExt};
use tokio::io;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use panel_core::proto::{Envelope, Outbound, Request};

pub type FramedStream = Framed<tokio::net::UnixStream, LengthDelimitedCodec>;

pub fn framed(stream: tokio::net::UnixStream) -> FramedStream {
    Framed::new(stream, LengthDelimitedCodec::new())
}

pub async fn send_request(framed: &mut FramedStream, req: &Envelope<Request>) -> io::Result<()> {
    let bytes = serde_json::to_vec(req)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    framed.send(bytes.into()).await
}

/// Daemon side: next request, or `None` once the peer hangs up.
pub async fn read_request(framed: &mut FramedStream) -> io::Result<Option<Envelope<Request>>> {
    let Some(frame) = framed.next().await else {
        return Ok(None);
    };
    let frame = frame?;

    serde_json::from_slice::<Envelope<Request>>(&frame)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub async fn send_outbound(framed: &mut FramedStream, out: &Outbound) -> io::Result<()> {
    let bytes = serde_json::to_vec(out)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    framed.send(bytes.into()).await
}

/// Client side: next response or pushed event, `None` on clean close.
pub async fn read_outbound(framed: &mut FramedStream) -> io::Result<Option<Outbound>> {
    let Some(frame) = framed.next().await else {
        return Ok(None);
    };
    let frame = frame?;

    serde_json::from_slice::<Outbound>(&frame)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
