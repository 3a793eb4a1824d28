// ABOUTME: hosts the tcp accept loop that parses one sentence per connection and frames the result.
// ABOUTME: connections are handled strictly one at a time; a failing connection never stops the loop.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use relex_common::{phrase_comment, sentence_trailer, ServerConfig, NO_PARSES};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::engine::{ParseResult, ParsingEngine, ResultFormatter, Sentence};
use crate::sink::OutputSink;

const MAX_LINE_BYTES: u64 = 64 * 1024;

pub struct Server<E, F> {
    config: ServerConfig,
    listener: TcpListener,
    downstream: Option<TcpStream>,
    engine: E,
    formatter: F,
}

impl<E, F> Server<E, F>
where
    E: ParsingEngine,
    F: ResultFormatter<E::Parse>,
{
    /// Binds the listen port and, when configured, connects to the downstream
    /// host. Either failure is fatal to the caller.
    pub async fn bind(config: ServerConfig, engine: E, formatter: F) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", config.listen_port))
            .await
            .with_context(|| format!("listen failed on port {}", config.listen_port))?;

        let downstream = match &config.downstream {
            Some(target) => {
                let stream = TcpStream::connect(target.addr())
                    .await
                    .with_context(|| format!("unable to connect to {target}"))?;
                tracing::info!("will send output to {target}");
                Some(stream)
            }
            None => None,
        };

        Ok(Server {
            config,
            listener,
            downstream,
            engine,
            formatter,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn serve(mut self) -> anyhow::Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!("accept failed: {err}");
                    continue;
                }
            };

            tracing::info!(%peer, "socket accept");
            if let Err(err) = self.handle_connection(stream).await {
                tracing::warn!(%peer, "processing input failed: {err:#}");
            }
        }
    }

    async fn handle_connection(&mut self, stream: TcpStream) -> anyhow::Result<()> {
        let timeout = self.config.io_timeout();
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let line = match bounded(timeout, read_line(&mut reader))
            .await
            .context("read input line")?
        {
            InputLine::Line(line) => line,
            InputLine::Closed => {
                tracing::debug!("peer closed without sending a line");
                return Ok(());
            }
            InputLine::TooLong => {
                tracing::warn!(
                    limit_bytes = MAX_LINE_BYTES,
                    "input line exceeds limit, abandoning connection"
                );
                return Ok(());
            }
        };
        tracing::info!(input = %line, "recv input");

        let sentence = self
            .engine
            .process_sentence(&line)
            .context("parse sentence")?;

        let mut sink = match self.downstream.as_mut() {
            Some(downstream) => OutputSink::Downstream(downstream),
            None => OutputSink::Peer(write_half),
        };
        write_sentence(&mut sink, &sentence, &self.formatter, &self.config)
            .await
            .with_context(|| format!("write sentence to {}", sink.describe()))?;
        bounded(timeout, sink.finish())
            .await
            .context("close response stream")?;
        tracing::info!("closed printer");

        drop(reader);
        tracing::info!("closed socket");
        Ok(())
    }
}

async fn write_sentence<P, D, Q, F>(
    sink: &mut OutputSink<'_, P, D>,
    sentence: &Sentence<Q>,
    formatter: &F,
    config: &ServerConfig,
) -> anyhow::Result<()>
where
    P: AsyncWrite + Unpin,
    D: AsyncWrite + Unpin,
    Q: ParseResult,
    F: ResultFormatter<Q>,
{
    let timeout = config.io_timeout();

    if sentence.parses.is_empty() {
        bounded(timeout, sink.write_line(NO_PARSES)).await?;
        return Ok(());
    }

    let count = config.max_parses.min(sentence.parses.len());
    for parse in sentence.parses.iter().take(count) {
        bounded(timeout, sink.write_line(&phrase_comment(&parse.phrase_string()))).await?;
        if config.verbose {
            print!("{}", formatter.verbose_rendering(parse));
        }
        bounded(timeout, sink.write_line(&formatter.format(parse))).await?;
    }

    for line in sentence_trailer(&sentence.id) {
        bounded(timeout, sink.write_line(&line)).await?;
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum InputLine {
    Line(String),
    /// The peer closed before sending anything.
    Closed,
    TooLong,
}

/// Reads one newline-terminated line of at most `MAX_LINE_BYTES`.
async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<InputLine> {
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(MAX_LINE_BYTES + 1)
        .read_until(b'\n', &mut buf)
        .await?;
    if n == 0 {
        return Ok(InputLine::Closed);
    }
    if buf.len() as u64 > MAX_LINE_BYTES {
        return Ok(InputLine::TooLong);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(InputLine::Line(String::from_utf8_lossy(&buf).into_owned()))
}

async fn bounded<T>(
    limit: Option<Duration>,
    op: impl Future<Output = std::io::Result<T>>,
) -> anyhow::Result<T> {
    match limit {
        Some(limit) => match tokio::time::timeout(limit, op).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(anyhow::anyhow!("timed out after {}s", limit.as_secs())),
        },
        None => Ok(op.await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rules::RuleEngine;
    use crate::engine::scheme::OpenCogScheme;
    use crate::engine::EngineSettings;
    use relex_common::{parse_frames, Downstream, Frame, SentenceFrame};
    use tokio::io::AsyncWriteExt;

    struct FakeParse(String);

    impl ParseResult for FakeParse {
        fn phrase_string(&self) -> String {
            self.0.clone()
        }
    }

    struct FakeEngine {
        parses: usize,
        sentences: usize,
    }

    impl ParsingEngine for FakeEngine {
        type Parse = FakeParse;

        fn process_sentence(&mut self, text: &str) -> anyhow::Result<Sentence<FakeParse>> {
            self.sentences += 1;
            let id = format!("sentence@test-{}", self.sentences);
            if text.trim().is_empty() {
                return Ok(Sentence { id, parses: vec![] });
            }
            let parses = (0..self.parses)
                .map(|rank| FakeParse(format!("(S {text} #{rank})")))
                .collect();
            Ok(Sentence { id, parses })
        }
    }

    struct FakeFormatter;

    const CONSOLE_ONLY: &str = "console-only rendering";

    impl ResultFormatter<FakeParse> for FakeFormatter {
        fn format(&self, parse: &FakeParse) -> String {
            format!("(ParseNode \"{}\")", parse.0)
        }

        fn verbose_rendering(&self, parse: &FakeParse) -> String {
            format!("{CONSOLE_ONLY} {}\n", parse.0)
        }
    }

    fn test_config(max_parses: usize) -> ServerConfig {
        ServerConfig {
            listen_port: 0,
            max_parses,
            ..ServerConfig::default()
        }
    }

    fn loopback(addr: SocketAddr) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], addr.port()))
    }

    async fn start_fake(config: ServerConfig, parses: usize) -> SocketAddr {
        let engine = FakeEngine { parses, sentences: 0 };
        let server = Server::bind(config, engine, FakeFormatter).await.unwrap();
        let addr = loopback(server.local_addr().unwrap());
        tokio::spawn(server.serve());
        addr
    }

    async fn request(addr: SocketAddr, line: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(format!("{line}\n").as_bytes()).await.unwrap();
        let mut out = String::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut out))
            .await
            .unwrap()
            .unwrap();
        out
    }

    fn single_sentence(out: &str) -> SentenceFrame {
        let mut frames = parse_frames(out).unwrap();
        assert_eq!(frames.len(), 1, "unexpected output: {out}");
        match frames.remove(0) {
            Frame::Sentence(s) => s,
            Frame::NoParses => panic!("expected a parsed sentence"),
        }
    }

    #[tokio::test]
    async fn zero_parses_write_only_the_marker() {
        let addr = start_fake(test_config(3), 2).await;
        let out = request(addr, "").await;
        assert_eq!(out, "; NO PARSES\n");
    }

    #[tokio::test]
    async fn emits_at_most_max_parses_in_rank_order() {
        let addr = start_fake(test_config(2), 3).await;
        let sentence = single_sentence(&request(addr, "hello there").await);

        let phrases: Vec<_> = sentence.parses.iter().map(|p| p.phrase.as_str()).collect();
        assert_eq!(phrases, vec!["(S hello there #0)", "(S hello there #1)"]);
        assert_eq!(sentence.parses[0].record, "(ParseNode \"(S hello there #0)\")");
    }

    #[tokio::test]
    async fn emits_every_parse_when_fewer_than_max() {
        let addr = start_fake(test_config(5), 2).await;
        let sentence = single_sentence(&request(addr, "hello").await);
        assert_eq!(sentence.parses.len(), 2);
    }

    #[tokio::test]
    async fn trailer_carries_sentence_id_verbatim() {
        let addr = start_fake(test_config(1), 1).await;
        let out = request(addr, "hello").await;

        assert!(out.ends_with(
            "(ListLink (stv 1 1)\n   (AnchorNode \"# New Parsed Sentence\")\n   (SentenceNode \"sentence@test-1\")\n)\n; END OF SENTENCE\n"
        ));
        assert_eq!(single_sentence(&out).sentence_id, "sentence@test-1");
    }

    #[tokio::test]
    async fn crlf_line_endings_are_stripped() {
        let addr = start_fake(test_config(1), 1).await;
        let sentence = single_sentence(&request(addr, "hello\r").await);
        assert_eq!(sentence.parses[0].phrase, "(S hello #0)");
    }

    #[tokio::test]
    async fn silent_connection_is_dropped_and_next_is_served() {
        let addr = start_fake(test_config(1), 1).await;

        let mut silent = TcpStream::connect(addr).await.unwrap();
        silent.shutdown().await.unwrap();
        let mut out = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), silent.read_to_end(&mut out))
            .await
            .unwrap()
            .unwrap();
        assert!(out.is_empty());

        let sentence = single_sentence(&request(addr, "next").await);
        assert_eq!(sentence.sentence_id, "sentence@test-1");
    }

    #[tokio::test]
    async fn each_peer_gets_only_its_own_response() {
        let addr = start_fake(test_config(1), 1).await;

        let first = single_sentence(&request(addr, "first").await);
        let second = single_sentence(&request(addr, "second").await);

        assert_eq!(first.sentence_id, "sentence@test-1");
        assert_eq!(first.parses[0].phrase, "(S first #0)");
        assert_eq!(second.sentence_id, "sentence@test-2");
        assert_eq!(second.parses[0].phrase, "(S second #0)");
    }

    #[tokio::test]
    async fn oversized_line_abandons_connection_only() {
        let addr = start_fake(test_config(1), 1).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let big = vec![b'a'; MAX_LINE_BYTES as usize + 16];
        let _ = stream.write_all(&big).await;
        let _ = stream.write_all(b"\n").await;
        let mut out = Vec::new();
        let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out)).await;
        assert!(!String::from_utf8_lossy(&out).contains("END OF SENTENCE"));

        let sentence = single_sentence(&request(addr, "after").await);
        assert_eq!(sentence.parses[0].phrase, "(S after #0)");
    }

    #[tokio::test]
    async fn read_line_reports_closed_and_oversized_input() {
        let mut empty: &[u8] = b"";
        assert_eq!(read_line(&mut empty).await.unwrap(), InputLine::Closed);

        let mut unterminated: &[u8] = b"last words";
        assert_eq!(
            read_line(&mut unterminated).await.unwrap(),
            InputLine::Line("last words".to_string())
        );

        let big = vec![b'a'; MAX_LINE_BYTES as usize + 1];
        let mut oversized: &[u8] = &big;
        assert_eq!(read_line(&mut oversized).await.unwrap(), InputLine::TooLong);

        let fits = vec![b'a'; MAX_LINE_BYTES as usize];
        let mut at_limit: &[u8] = &fits;
        assert!(matches!(read_line(&mut at_limit).await.unwrap(), InputLine::Line(l) if l.len() == fits.len()));
    }

    #[tokio::test]
    async fn verbose_mode_never_changes_network_output() {
        let quiet_addr = start_fake(test_config(2), 2).await;
        let quiet = request(quiet_addr, "hello there").await;

        let config = ServerConfig {
            verbose: true,
            ..test_config(2)
        };
        let verbose_addr = start_fake(config, 2).await;
        let verbose = request(verbose_addr, "hello there").await;

        assert_eq!(verbose, quiet);
        assert!(!verbose.contains(CONSOLE_ONLY));
        assert_eq!(single_sentence(&verbose).parses.len(), 2);
    }

    #[tokio::test]
    async fn stalled_peer_times_out_when_bounded() {
        let config = ServerConfig {
            io_timeout_secs: Some(1),
            ..test_config(1)
        };
        let addr = start_fake(config, 1).await;

        let _stalled = TcpStream::connect(addr).await.unwrap();
        let sentence = single_sentence(&request(addr, "patient").await);
        assert_eq!(sentence.parses[0].phrase, "(S patient #0)");
    }

    #[tokio::test]
    async fn downstream_receives_every_sentence_in_order() {
        let downstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ds_addr = downstream.local_addr().unwrap();

        let config = ServerConfig {
            downstream: Some(Downstream {
                host: "127.0.0.1".to_string(),
                port: ds_addr.port(),
            }),
            ..test_config(1)
        };
        let addr = start_fake(config, 1).await;
        let (mut ds_stream, _) = downstream.accept().await.unwrap();

        assert_eq!(request(addr, "first").await, "");
        assert_eq!(request(addr, "").await, "");
        assert_eq!(request(addr, "second").await, "");

        let mut received = String::new();
        let mut buf = [0u8; 4096];
        while received.matches("; END OF SENTENCE").count() < 2 {
            let n = tokio::time::timeout(Duration::from_secs(5), ds_stream.read(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert!(n > 0, "downstream closed early");
            received.push_str(&String::from_utf8_lossy(&buf[..n]));
        }

        let frames = parse_frames(&received).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1], Frame::NoParses);
        match (&frames[0], &frames[2]) {
            (Frame::Sentence(a), Frame::Sentence(b)) => {
                assert_eq!(a.sentence_id, "sentence@test-1");
                assert_eq!(a.parses[0].phrase, "(S first #0)");
                assert_eq!(b.sentence_id, "sentence@test-3");
                assert_eq!(b.parses[0].phrase, "(S second #0)");
            }
            other => panic!("unexpected frames: {other:?}"),
        }
    }

    #[tokio::test]
    async fn lost_downstream_does_not_stop_the_loop() {
        let downstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ds_addr = downstream.local_addr().unwrap();

        let config = ServerConfig {
            downstream: Some(Downstream {
                host: "127.0.0.1".to_string(),
                port: ds_addr.port(),
            }),
            ..test_config(1)
        };
        let addr = start_fake(config, 1).await;
        let (ds_stream, _) = downstream.accept().await.unwrap();
        drop(ds_stream);
        drop(downstream);
        tokio::time::sleep(Duration::from_millis(50)).await;

        for line in ["first", "second", "third"] {
            assert_eq!(request(addr, line).await, "");
        }

        let mut silent = TcpStream::connect(addr).await.unwrap();
        silent.shutdown().await.unwrap();
        let mut out = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), silent.read_to_end(&mut out))
            .await
            .unwrap()
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn bind_failure_is_fatal() {
        let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let config = ServerConfig {
            listen_port: port,
            ..ServerConfig::default()
        };
        let err = Server::bind(config, FakeEngine { parses: 1, sentences: 0 }, FakeFormatter)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("listen failed"));
    }

    #[tokio::test]
    async fn downstream_connect_failure_is_fatal() {
        let unused = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = unused.local_addr().unwrap().port();
        drop(unused);

        let config = ServerConfig {
            downstream: Some(Downstream {
                host: "127.0.0.1".to_string(),
                port,
            }),
            ..test_config(1)
        };
        let err = Server::bind(config, FakeEngine { parses: 1, sentences: 0 }, FakeFormatter)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("unable to connect"));
    }

    #[tokio::test]
    async fn rule_engine_frames_simple_sentence() {
        let config = test_config(1);
        let engine = RuleEngine::new(EngineSettings::from_config(&config));
        let formatter = OpenCogScheme::new(config.categories.clone());
        let server = Server::bind(config, engine, formatter).await.unwrap();
        let addr = loopback(server.local_addr().unwrap());
        tokio::spawn(server.serve());

        let sentence = single_sentence(&request(addr, "The cat sat.").await);
        assert!(sentence.sentence_id.starts_with("sentence@"));
        assert!(sentence.sentence_id.len() > "sentence@".len());
        assert_eq!(sentence.parses.len(), 1);
        assert_eq!(sentence.parses[0].phrase, "(S (NP The cat) (VP sat) .)");
        assert!(sentence.parses[0].record.contains("\"_subj\""));

        assert_eq!(request(addr, "").await, "; NO PARSES\n");
    }
}
