// ABOUTME: writes protocol lines either back to the connected peer or to the persistent downstream host.
// ABOUTME: finishing a peer sink closes its stream; finishing a downstream sink only flushes it.

use tokio::io::{AsyncWrite, AsyncWriteExt};

pub enum OutputSink<'a, P, D> {
    /// The write half of the connection the sentence arrived on.
    Peer(P),
    /// The one downstream connection opened at start-up, borrowed for a single sentence.
    Downstream(&'a mut D),
}

impl<P, D> OutputSink<'_, P, D>
where
    P: AsyncWrite + Unpin,
    D: AsyncWrite + Unpin,
{
    pub async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        match self {
            OutputSink::Peer(w) => w.write_all(&buf).await,
            OutputSink::Downstream(w) => w.write_all(&buf).await,
        }
    }

    pub async fn finish(self) -> std::io::Result<()> {
        match self {
            OutputSink::Peer(mut w) => w.shutdown().await,
            OutputSink::Downstream(w) => w.flush().await,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            OutputSink::Peer(_) => "peer",
            OutputSink::Downstream(_) => "downstream",
        }
    }
}
