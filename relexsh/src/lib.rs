// ABOUTME: provides relexsh helpers for preparing sentences and checking captured parse output.
// ABOUTME: keeps client behavior predictable by sending exactly one line per request.

use relex_common::{parse_frames, Frame};

/// Normalizes user input to the single line the server will read. Input
/// spanning several non-empty lines is refused rather than silently cut.
pub fn request_line(input: &str) -> anyhow::Result<String> {
    let mut lines = input.lines().map(str::trim_end).filter(|l| !l.trim().is_empty());
    let first = lines.next().unwrap_or("").to_string();
    if lines.next().is_some() {
        return Err(anyhow::anyhow!("input must be a single sentence on one line"));
    }
    Ok(first)
}

#[derive(Debug, serde::Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CheckVerdict {
    pub ok: bool,
    pub sentences: usize,
    pub no_parses: usize,
    pub parses_per_sentence: Vec<usize>,
    pub sentence_ids: Vec<String>,
    pub error: Option<String>,
}

pub fn check_verdict(input: &str) -> CheckVerdict {
    match parse_frames(input) {
        Ok(frames) => {
            let mut verdict = CheckVerdict {
                ok: true,
                sentences: 0,
                no_parses: 0,
                parses_per_sentence: vec![],
                sentence_ids: vec![],
                error: None,
            };
            for frame in frames {
                match frame {
                    Frame::NoParses => verdict.no_parses += 1,
                    Frame::Sentence(s) => {
                        verdict.sentences += 1;
                        verdict.parses_per_sentence.push(s.parses.len());
                        verdict.sentence_ids.push(s.sentence_id);
                    }
                }
            }
            verdict
        }
        Err(err) => CheckVerdict {
            ok: false,
            sentences: 0,
            no_parses: 0,
            parses_per_sentence: vec![],
            sentence_ids: vec![],
            error: Some(err.to_string()),
        },
    }
}
