// ABOUTME: serializes rule-engine parses as opencog scheme records.
// ABOUTME: emits relation, linkage, and anaphora sections according to the enabled output categories.

use std::collections::BTreeSet;

use relex_common::OutputCategory;

use super::rules::{RuleParse, Token};
use super::ResultFormatter;

pub struct OpenCogScheme {
    categories: BTreeSet<OutputCategory>,
}

impl OpenCogScheme {
    pub fn new(categories: BTreeSet<OutputCategory>) -> Self {
        OpenCogScheme { categories }
    }

    fn shows(&self, category: OutputCategory) -> bool {
        self.categories.contains(&category)
    }
}

impl ResultFormatter<RuleParse> for OpenCogScheme {
    fn format(&self, parse: &RuleParse) -> String {
        let parse_id = parse.parse_id();
        let mut records = vec![format!(
            "(ParseLink (stv 1 1)\n   (ParseNode \"{}\")\n   (SentenceNode \"{}\")\n)",
            quote(&parse_id),
            quote(&parse.sentence_id)
        )];

        if self.shows(OutputCategory::Relex) {
            for token in parse.tokens.iter().filter(|t| t.is_word) {
                records.push(format!(
                    "(ReferenceLink (stv 1.0 1.0)\n   (WordInstanceNode \"{}\")\n   (WordNode \"{}\")\n)",
                    quote(&token.instance),
                    quote(&token.text)
                ));
                records.push(format!(
                    "(WordInstanceLink (stv 1.0 1.0)\n   (WordInstanceNode \"{}\")\n   (ParseNode \"{}\")\n)",
                    quote(&token.instance),
                    quote(&parse_id)
                ));
            }
            for rel in &parse.relations {
                records.push(pair_record(
                    "DefinedLinguisticRelationshipNode",
                    rel.name,
                    &parse.tokens[rel.head],
                    &parse.tokens[rel.dependent],
                ));
            }
        }

        if self.shows(OutputCategory::Link) {
            for link in &parse.links {
                records.push(pair_record(
                    "LinkGrammarRelationshipNode",
                    link.label,
                    &parse.tokens[link.left],
                    &parse.tokens[link.right],
                ));
            }
        }

        if self.shows(OutputCategory::Anaphora) {
            for a in &parse.anaphora {
                records.push(pair_record(
                    "PredicateNode",
                    "anaphoric-antecedent",
                    &parse.tokens[a.pronoun],
                    &parse.tokens[a.antecedent],
                ));
            }
        }

        records.join("\n")
    }

    fn verbose_rendering(&self, parse: &RuleParse) -> String {
        let mut out = String::new();
        for rel in &parse.relations {
            out.push_str(&format!(
                "{}({}, {})\n",
                rel.name, parse.tokens[rel.head].text, parse.tokens[rel.dependent].text
            ));
        }
        out
    }
}

fn pair_record(node_type: &str, name: &str, first: &Token, second: &Token) -> String {
    format!(
        "(EvaluationLink (stv 1.0 1.0)\n   ({node_type} \"{}\")\n   (ListLink\n      (WordInstanceNode \"{}\")\n      (WordInstanceNode \"{}\")\n   )\n)",
        quote(name),
        quote(&first.instance),
        quote(&second.instance)
    )
}

fn quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
