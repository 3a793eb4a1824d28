// ABOUTME: defines the shared configuration and wire protocol types used by relex-server and relexsh.
// ABOUTME: keeps sentence framing in one place so the daemon and its clients agree on it.

mod config;
mod protocol;

pub use config::{
    parse_max_parses, resolve_categories, CategoryFlags, ConfigError, Downstream, OutputCategory,
    ServerConfig, DEFAULT_LANGUAGE, DEFAULT_LISTEN_PORT, DEFAULT_MAX_PARSES,
};
pub use protocol::{
    parse_frames, phrase_comment, sentence_trailer, Frame, FrameError, FramedParse, SentenceFrame,
    END_OF_SENTENCE, NEW_SENTENCE_ANCHOR, NO_PARSES,
};
