// ABOUTME: runs the parse server daemon that turns plain-text sentences into opencog scheme output.
// ABOUTME: listens on a tcp port and replies to the peer or forwards everything to one downstream host.

mod engine;
mod server;
mod sink;

use clap::Parser;
use relex_common::{
    parse_max_parses, resolve_categories, CategoryFlags, Downstream, ServerConfig,
    DEFAULT_LANGUAGE, DEFAULT_LISTEN_PORT, DEFAULT_MAX_PARSES,
};
use tracing_subscriber::EnvFilter;

use crate::engine::rules::RuleEngine;
use crate::engine::scheme::OpenCogScheme;
use crate::engine::EngineSettings;
use crate::server::Server;

/// RelEx server (designed for OpenCog interaction).
/// Given a sentence, it returns a parse in opencog-style scheme format.
#[derive(Debug, Parser)]
#[command(name = "relex-server", version)]
struct Args {
    /// Port number to listen on
    #[arg(short = 'p', long = "port", default_value_t = DEFAULT_LISTEN_PORT)]
    port: u16,

    /// Send output to indicated host:port (example: localhost:17001)
    #[arg(long)]
    host: Option<Downstream>,

    /// Set language
    #[arg(long, default_value = DEFAULT_LANGUAGE)]
    lang: String,

    /// Max number of parses to return
    #[arg(short = 'n', default_value_t = DEFAULT_MAX_PARSES, value_parser = parse_max_parses)]
    max_parses: usize,

    /// Output RelEx relations (default)
    #[arg(long)]
    relex: bool,

    /// Output Link Grammar linkages
    #[arg(long)]
    link: bool,

    /// Output anaphora references
    #[arg(long)]
    anaphora: bool,

    /// Print parse output to server stdout
    #[arg(long)]
    verbose: bool,

    /// Abandon a connection when a single read or write stalls this long
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    io_timeout_secs: Option<u64>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let config = ServerConfig {
            listen_port: self.port,
            max_parses: self.max_parses,
            language: self.lang,
            categories: resolve_categories(CategoryFlags {
                relex: self.relex,
                link: self.link,
                anaphora: self.anaphora,
            }),
            verbose: self.verbose,
            downstream: self.host,
            io_timeout_secs: self.io_timeout_secs,
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("relex_server=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = Args::parse().into_config()?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting relex-server");
    if config.verbose {
        tracing::info!("verbose server mode set");
    }
    for category in &config.categories {
        tracing::info!("{category:?} output on");
    }
    tracing::info!(config = %serde_json::to_string(&config)?, "resolved configuration");

    let engine = RuleEngine::new(EngineSettings::from_config(&config));
    tracing::info!(language = %engine.settings().language, "parsing engine ready");
    let formatter = OpenCogScheme::new(config.categories.clone());

    let server = Server::bind(config, engine, formatter).await?;
    tracing::info!("listening on {}", server.local_addr()?);
    server.serve().await
}
