//! # Network event component
//!
//! Frames events onto a byte stream using [`PacketRoutes`] and
//! [`PacketCodec`]. Reads carry a timeout; a timed out read leaves the stream
//! usable.

use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::{
    events::Event,
    protocol::{NetworkError, PacketCodec, PacketRoutes, Secret},
};

pub mod lan;

/// Default timeout of a single read
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(4);

/// Outcome of [`EventReader::read_event`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Event(Event),
    /// Nothing arrived in time
    TimedOut,
    /// The peer closed the stream
    Closed,
}

/// Reading half of a [`NetworkEventComponent`]
#[derive(Debug)]
pub struct EventReader<R> {
    framed: FramedRead<R, PacketCodec>,
    routes: Arc<PacketRoutes>,
}

impl<R: AsyncRead + Unpin> EventReader<R> {
    pub fn new(reader: R, codec: PacketCodec, routes: Arc<PacketRoutes>) -> Self {
        Self {
            framed: FramedRead::new(reader, codec),
            routes,
        }
    }

    /// Reads the next event, waiting at most `timeout`
    pub async fn read_event(&mut self, timeout: Duration) -> Result<ReadOutcome, NetworkError> {
        let packet = match tokio::time::timeout(timeout, self.framed.next()).await {
            Err(_) => return Ok(ReadOutcome::TimedOut),
            Ok(None) => return Ok(ReadOutcome::Closed),
            Ok(Some(Err(NetworkError::Io(e)))) if is_disconnect(&e) => {
                log::debug!("Stream broken: {e}");
                return Ok(ReadOutcome::Closed);
            }
            Ok(Some(Err(e))) => return Err(e),
            Ok(Some(Ok(packet))) => packet,
        };

        self.routes.decode(&packet).map(ReadOutcome::Event)
    }
}

/// Writing half of a [`NetworkEventComponent`]
#[derive(Debug)]
pub struct EventWriter<W> {
    framed: FramedWrite<W, PacketCodec>,
    routes: Arc<PacketRoutes>,
}

impl<W: AsyncWrite + Unpin> EventWriter<W> {
    pub fn new(writer: W, codec: PacketCodec, routes: Arc<PacketRoutes>) -> Self {
        Self {
            framed: FramedWrite::new(writer, codec),
            routes,
        }
    }

    /// Sends an outbound event
    pub async fn write_event(&mut self, event: &Event) -> Result<(), NetworkError> {
        let packet = self.routes.encode(event)?;
        self.framed.send(packet).await
    }

    pub fn is_outbound(&self, name: &str) -> bool {
        self.routes.is_outbound(name)
    }

    /// Flushes pending bytes and shuts the write side down, sending EOF
    pub async fn close(&mut self) -> Result<(), NetworkError> {
        self.framed.close().await
    }
}

/// Bidirectional framed event stream
#[derive(Debug)]
pub struct NetworkEventComponent<S> {
    reader: EventReader<ReadHalf<S>>,
    writer: EventWriter<WriteHalf<S>>,
}

impl<S: AsyncRead + AsyncWrite> NetworkEventComponent<S> {
    pub fn new(stream: S, routes: PacketRoutes, secret: Option<&Secret>) -> Self {
        let routes = Arc::new(routes);
        let codec = || match secret {
            Some(secret) => PacketCodec::encrypted(secret),
            None => PacketCodec::new(),
        };
        let (read, write) = tokio::io::split(stream);
        Self {
            reader: EventReader::new(read, codec(), routes.clone()),
            writer: EventWriter::new(write, codec(), routes),
        }
    }

    pub async fn read_event(&mut self, timeout: Duration) -> Result<ReadOutcome, NetworkError> {
        self.reader.read_event(timeout).await
    }

    pub async fn write_event(&mut self, event: &Event) -> Result<(), NetworkError> {
        self.writer.write_event(event).await
    }

    pub async fn close(&mut self) -> Result<(), NetworkError> {
        self.writer.close().await
    }

    /// Splits into halves usable from separate tasks
    pub fn into_split(self) -> (EventReader<ReadHalf<S>>, EventWriter<WriteHalf<S>>) {
        (self.reader, self.writer)
    }
}

fn is_disconnect(error: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        error.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
    )
}
