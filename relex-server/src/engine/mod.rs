// ABOUTME: declares the contracts between the connection loop, the parsing engine, and the output formatter.
// ABOUTME: the loop only sees ranked parses with phrase strings; everything else stays opaque to it.

pub mod rules;
pub mod scheme;

use relex_common::ServerConfig;

/// Settings handed to the engine once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub language: String,
    pub max_parses: usize,
    pub compute_relations: bool,
}

impl EngineSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        EngineSettings {
            language: config.language.clone(),
            max_parses: config.max_parses,
            compute_relations: config.compute_relations(),
        }
    }
}

pub trait ParseResult {
    /// Bracketed constituent rendering, used as the comment line ahead of each record.
    fn phrase_string(&self) -> String;
}

/// One input line after parsing. Parses are ordered best first.
#[derive(Debug, Clone)]
pub struct Sentence<P> {
    pub id: String,
    pub parses: Vec<P>,
}

pub trait ParsingEngine {
    type Parse: ParseResult;

    fn process_sentence(&mut self, text: &str) -> anyhow::Result<Sentence<Self::Parse>>;
}

pub trait ResultFormatter<P> {
    /// The protocol record for one parse, without a trailing newline.
    fn format(&self, parse: &P) -> String;

    /// Operator-facing rendering printed to stdout in verbose mode.
    fn verbose_rendering(&self, parse: &P) -> String;
}
