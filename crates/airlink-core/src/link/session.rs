//! One established byte-stream session

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use super::events::{PeerEvent, PeerId};

/// Write half and shutdown handle of the active connection.
///
/// The read half lives on the worker thread running [`pump`].
pub(crate) struct Session {
    peer: PeerId,
    stream: TcpStream,
    writer: Arc<Mutex<TcpStream>>,
}

impl Session {
    /// Split `stream` into a session and the reader for its worker.
    pub(crate) fn open(peer: PeerId, stream: TcpStream) -> io::Result<(Self, TcpStream)> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        let reader = stream.try_clone()?;
        let writer = Arc::new(Mutex::new(stream.try_clone()?));
        Ok((
            Self {
                peer,
                stream,
                writer,
            },
            reader,
        ))
    }

    pub(crate) fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Shared writer; the mutex keeps writes from interleaving.
    pub(crate) fn writer(&self) -> Arc<Mutex<TcpStream>> {
        self.writer.clone()
    }

    /// Unblock the reader and refuse further writes.
    pub(crate) fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Write `data` as one send.
pub(crate) fn write_frame(writer: &Mutex<TcpStream>, data: &[u8]) -> io::Result<()> {
    let mut stream = writer.lock();
    stream.write_all(data)?;
    stream.flush()
}

/// Forward every chunk read from `reader` as [`PeerEvent::Data`].
///
/// Returns `Ok` when the peer closes the stream, `Err` on a read failure.
pub(crate) fn pump(
    mut reader: TcpStream,
    buffer_size: usize,
    events: &UnboundedSender<PeerEvent>,
) -> io::Result<()> {
    let mut buffer = vec![0u8; buffer_size.max(1)];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(n) => {
                trace!(bytes = n, "Received chunk");
                // Receiver gone means nobody is listening; keep draining until close
                let _ = events.send(PeerEvent::Data(Bytes::copy_from_slice(&buffer[..n])));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
