// ABOUTME: implements a small deterministic rule-based parsing engine for plain-text sentences.
// ABOUTME: produces ranked head-verb candidates with linkage, relations, and pronoun antecedents.

use uuid::Uuid;

use super::{EngineSettings, ParseResult, ParsingEngine, Sentence};

const FUNCTION_WORDS: &[&str] = &[
    "a", "an", "the", "this", "that", "these", "those", "of", "on", "in", "at", "to", "for", "with",
    "by", "from", "and", "or", "but",
];

const PRONOUNS: &[&str] = &[
    "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them", "his", "its",
    "their", "my", "your", "our",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub instance: String,
    pub is_word: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub name: &'static str,
    pub head: usize,
    pub dependent: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub label: &'static str,
    pub left: usize,
    pub right: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Antecedent {
    pub pronoun: usize,
    pub antecedent: usize,
}

#[derive(Debug, Clone)]
pub struct RuleParse {
    pub sentence_id: String,
    pub rank: usize,
    pub tokens: Vec<Token>,
    pub head: usize,
    pub relations: Vec<Relation>,
    pub links: Vec<Link>,
    pub anaphora: Vec<Antecedent>,
}

impl RuleParse {
    pub fn parse_id(&self) -> String {
        format!("{}_parse_{}", self.sentence_id, self.rank)
    }
}

impl ParseResult for RuleParse {
    fn phrase_string(&self) -> String {
        let last_word = self
            .tokens
            .iter()
            .rposition(|t| t.is_word)
            .unwrap_or(self.head);
        let join = |range: std::ops::Range<usize>| {
            self.tokens[range]
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        };

        let mut out = String::from("(S");
        if self.head > 0 {
            out.push_str(&format!(" (NP {})", join(0..self.head)));
        }
        out.push_str(&format!(" (VP {})", join(self.head..last_word + 1)));
        if last_word + 1 < self.tokens.len() {
            out.push(' ');
            out.push_str(&join(last_word + 1..self.tokens.len()));
        }
        out.push(')');
        out
    }
}

pub struct RuleEngine {
    settings: EngineSettings,
}

impl RuleEngine {
    pub fn new(settings: EngineSettings) -> Self {
        RuleEngine { settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

impl ParsingEngine for RuleEngine {
    type Parse = RuleParse;

    fn process_sentence(&mut self, text: &str) -> anyhow::Result<Sentence<RuleParse>> {
        let sentence_id = format!("sentence@{}", Uuid::new_v4());
        let words = tokenize(text);
        if !words.iter().any(|(text, _)| text.chars().any(char::is_alphabetic)) {
            return Ok(Sentence {
                id: sentence_id,
                parses: vec![],
            });
        }

        let parses = rank_heads(&words)
            .into_iter()
            .take(self.settings.max_parses)
            .enumerate()
            .map(|(rank, head)| {
                let tokens: Vec<Token> = words
                    .iter()
                    .map(|(text, is_word)| Token {
                        text: text.clone(),
                        instance: format!("{}@{}", text, Uuid::new_v4()),
                        is_word: *is_word,
                    })
                    .collect();
                let relations = if self.settings.compute_relations {
                    relations(&tokens, head)
                } else {
                    vec![]
                };
                let links = links(&tokens, head);
                let anaphora = anaphora(&tokens, head);
                RuleParse {
                    sentence_id: sentence_id.clone(),
                    rank,
                    tokens,
                    head,
                    relations,
                    links,
                    anaphora,
                }
            })
            .collect();

        Ok(Sentence {
            id: sentence_id,
            parses,
        })
    }
}

fn is_function_word(text: &str) -> bool {
    FUNCTION_WORDS.contains(&text.to_lowercase().as_str())
}

fn is_pronoun(text: &str) -> bool {
    PRONOUNS.contains(&text.to_lowercase().as_str())
}

fn is_attached_punct(c: char) -> bool {
    !c.is_alphanumeric() && c != '\'' && c != '-'
}

/// Splits on whitespace and peels leading and trailing punctuation off each
/// chunk into separate tokens.
fn tokenize(text: &str) -> Vec<(String, bool)> {
    let mut out = Vec::new();
    for chunk in text.split_whitespace() {
        let start = chunk.find(|c: char| !is_attached_punct(c));
        let Some(start) = start else {
            out.extend(chunk.chars().map(|c| (c.to_string(), false)));
            continue;
        };
        let end = chunk
            .rfind(|c: char| !is_attached_punct(c))
            .map(|i| i + chunk[i..].chars().next().map_or(1, char::len_utf8))
            .unwrap_or(chunk.len());

        out.extend(chunk[..start].chars().map(|c| (c.to_string(), false)));
        let core = &chunk[start..end];
        out.push((core.to_string(), core.chars().any(char::is_alphanumeric)));
        out.extend(chunk[end..].chars().map(|c| (c.to_string(), false)));
    }
    out
}

/// Content words are head candidates. The second content word ranks first,
/// then the ones after it in order, and the first content word last.
fn rank_heads(words: &[(String, bool)]) -> Vec<usize> {
    let content: Vec<usize> = words
        .iter()
        .enumerate()
        .filter(|(_, (text, is_word))| *is_word && !is_function_word(text) && !is_pronoun(text))
        .map(|(i, _)| i)
        .collect();

    match content.split_first() {
        Some((first, rest)) => {
            let mut ranked: Vec<usize> = rest.to_vec();
            ranked.push(*first);
            ranked
        }
        None => words.iter().position(|(_, is_word)| *is_word).into_iter().collect(),
    }
}

fn relations(tokens: &[Token], head: usize) -> Vec<Relation> {
    let argument = |i: &usize| tokens[*i].is_word && !is_function_word(&tokens[*i].text);
    let mut out = Vec::new();
    if let Some(subject) = (0..head).rev().find(argument) {
        out.push(Relation {
            name: "_subj",
            head,
            dependent: subject,
        });
    }
    if let Some(object) = (head + 1..tokens.len()).rev().find(argument) {
        out.push(Relation {
            name: "_obj",
            head,
            dependent: object,
        });
    }
    out
}

fn links(tokens: &[Token], head: usize) -> Vec<Link> {
    (1..tokens.len())
        .map(|right| {
            let left = right - 1;
            let label = if !tokens[right].is_word {
                "Xp"
            } else if right == head {
                "S"
            } else if left == head {
                "O"
            } else if right < head {
                "D"
            } else {
                "J"
            };
            Link { label, left, right }
        })
        .collect()
}

fn anaphora(tokens: &[Token], head: usize) -> Vec<Antecedent> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_word && is_pronoun(&t.text))
        .filter_map(|(pronoun, _)| {
            (0..pronoun)
                .rev()
                .find(|i| {
                    let t = &tokens[*i];
                    *i != head && t.is_word && !is_function_word(&t.text) && !is_pronoun(&t.text)
                })
                .map(|antecedent| Antecedent {
                    pronoun,
                    antecedent,
                })
        })
        .collect()
}
