// ABOUTME: renders and parses the line-oriented parse output protocol.
// ABOUTME: every sentence ends with a fixed trailer block, zero-parse sentences with a single marker line.

use serde::Serialize;

pub const NO_PARSES: &str = "; NO PARSES";
pub const END_OF_SENTENCE: &str = "; END OF SENTENCE";
pub const NEW_SENTENCE_ANCHOR: &str = "# New Parsed Sentence";

const TRAILER_OPEN: &str = "(ListLink (stv 1 1)";
const TRAILER_CLOSE: &str = ")";

/// Comment line carrying a parse's phrase string. Embedded newlines would
/// break framing, so they are folded into spaces.
pub fn phrase_comment(phrase: &str) -> String {
    let folded: String = phrase
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    format!("; {folded}")
}

/// The closing block written after the last parse of a sentence, including
/// the end-of-sentence marker line.
pub fn sentence_trailer(sentence_id: &str) -> Vec<String> {
    vec![
        TRAILER_OPEN.to_string(),
        format!("   (AnchorNode \"{NEW_SENTENCE_ANCHOR}\")"),
        format!("   (SentenceNode \"{sentence_id}\")"),
        TRAILER_CLOSE.to_string(),
        END_OF_SENTENCE.to_string(),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FramedParse {
    pub phrase: String,
    pub record: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentenceFrame {
    pub sentence_id: String,
    pub parses: Vec<FramedParse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    NoParses,
    Sentence(SentenceFrame),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("line {line}: record text before any phrase comment")]
    RecordWithoutPhrase { line: usize },
    #[error("line {line}: unexpected {text:?} inside a sentence")]
    Unexpected { line: usize, text: String },
    #[error("line {line}: end of sentence without a trailer block")]
    MissingTrailer { line: usize },
    #[error("line {line}: malformed sentence trailer")]
    MalformedTrailer { line: usize },
    #[error("line {line}: trailer for a sentence with no parses")]
    EmptySentence { line: usize },
    #[error("stream ended inside a sentence")]
    Truncated,
}

#[derive(Default)]
struct PendingSentence {
    parses: Vec<FramedParse>,
    sentence_id: Option<String>,
}

/// Splits a captured output stream back into sentences. Blank lines between
/// sentences are ignored; a stream that stops mid-sentence is an error.
pub fn parse_frames(input: &str) -> Result<Vec<Frame>, FrameError> {
    let lines: Vec<&str> = input.lines().map(|l| l.strip_suffix('\r').unwrap_or(l)).collect();
    let mut frames = Vec::new();
    let mut pending: Option<PendingSentence> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let line_no = i + 1;

        if line == NO_PARSES {
            if pending.is_some() {
                return Err(FrameError::Unexpected {
                    line: line_no,
                    text: line.to_string(),
                });
            }
            frames.push(Frame::NoParses);
            i += 1;
            continue;
        }

        if line == END_OF_SENTENCE {
            let sentence = pending.take().unwrap_or_default();
            let sentence_id = sentence
                .sentence_id
                .ok_or(FrameError::MissingTrailer { line: line_no })?;
            frames.push(Frame::Sentence(SentenceFrame {
                sentence_id,
                parses: sentence.parses,
            }));
            i += 1;
            continue;
        }

        let sentence = pending.get_or_insert_with(PendingSentence::default);
        if sentence.sentence_id.is_some() {
            return Err(FrameError::Unexpected {
                line: line_no,
                text: line.to_string(),
            });
        }

        if is_trailer_start(&lines[i..]) {
            if sentence.parses.is_empty() {
                return Err(FrameError::EmptySentence { line: line_no });
            }
            let id = trailer_sentence_id(&lines[i..])
                .ok_or(FrameError::MalformedTrailer { line: line_no })?;
            sentence.sentence_id = Some(id.to_string());
            i += 4;
            continue;
        }

        if let Some(phrase) = line.strip_prefix("; ") {
            sentence.parses.push(FramedParse {
                phrase: phrase.to_string(),
                record: String::new(),
            });
        } else if sentence.parses.is_empty() {
            if !line.trim().is_empty() {
                return Err(FrameError::RecordWithoutPhrase { line: line_no });
            }
            pending = None;
        } else if let Some(parse) = sentence.parses.last_mut() {
            if !parse.record.is_empty() {
                parse.record.push('\n');
            }
            parse.record.push_str(line);
        }
        i += 1;
    }

    if pending.is_some() {
        return Err(FrameError::Truncated);
    }
    Ok(frames)
}

fn is_trailer_start(lines: &[&str]) -> bool {
    lines.len() >= 2
        && lines[0] == TRAILER_OPEN
        && lines[1].trim() == format!("(AnchorNode \"{NEW_SENTENCE_ANCHOR}\")")
}

fn trailer_sentence_id<'a>(lines: &[&'a str]) -> Option<&'a str> {
    if lines.len() < 4 || lines[3] != TRAILER_CLOSE {
        return None;
    }
    lines[2]
        .trim()
        .strip_prefix("(SentenceNode \"")?
        .strip_suffix("\")")
}
