// ABOUTME: provides a user-facing cli for sending sentences to the parse server and inspecting its output.
// ABOUTME: can also stand in for the downstream host and print everything forwarded to it.

use anyhow::Context;
use clap::{Parser, Subcommand};
use relex_common::END_OF_SENTENCE;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

use relexsh::{check_verdict, request_line};

#[derive(Debug, Parser)]
#[command(name = "relexsh")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Send {
        #[arg(long, default_value = "127.0.0.1:4444")]
        addr: String,

        #[arg(long)]
        file: Option<String>,

        #[arg(long)]
        text: Option<String>,
    },
    Listen {
        #[arg(long, default_value_t = 17001)]
        port: u16,
    },
    Check {
        #[arg(long)]
        file: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("relexsh=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Send { addr, file, text } => {
            let input = read_input(file.as_deref(), text.as_deref()).await?;
            let line = request_line(&input)?;
            let response = send(&addr, &line).await?;
            print!("{response}");
        }
        Command::Listen { port } => listen(port).await?,
        Command::Check { file } => {
            let input = read_input(file.as_deref(), None).await?;
            let verdict = check_verdict(&input);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
    }

    Ok(())
}

async fn read_input(file: Option<&str>, text: Option<&str>) -> anyhow::Result<String> {
    if let Some(text) = text {
        return Ok(text.to_string());
    }

    if let Some(file) = file {
        return tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("read {file}"));
    }

    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;
    Ok(input)
}

async fn send(addr: &str, line: &str) -> anyhow::Result<String> {
    let mut stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("connect {addr}"))?;
    stream.write_all(format!("{line}\n").as_bytes()).await?;
    stream.shutdown().await?;

    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    Ok(response)
}

async fn listen(port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("bind port {port}"))?;
    tracing::info!("waiting for the parse server on port {port}");

    let (stream, peer) = listener.accept().await?;
    tracing::info!(%peer, "parse server connected");

    let mut lines = BufReader::new(stream).lines();
    let mut sentences = 0usize;
    while let Some(line) = lines.next_line().await? {
        println!("{line}");
        if line == END_OF_SENTENCE {
            sentences += 1;
            tracing::info!(sentences, "sentence received");
        }
    }

    tracing::info!(sentences, "parse server disconnected");
    Ok(())
}
