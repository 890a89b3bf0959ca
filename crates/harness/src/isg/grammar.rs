//! Grammar-driven text expansion.
//!
//! The instruction stream generators describe their output as context-free
//! grammars: a mapping from nonterminals (`<foo>`) to expansion rules. A rule
//! is either a list of alternative expansions or a producer closure; each
//! alternative is either a literal (possibly containing further nonterminals)
//! or itself a producer closure. This closed sum shape keeps the dynamic
//! rule tables type-checked while still allowing stateful helpers (register
//! allocators, label counters) to participate in expansion.
//!
//! Expansion picks a *random* remaining nonterminal occurrence each step
//! rather than the leftmost one; combined with the nonterminal cap this keeps
//! recursive rules bounded without rewriting the grammar.

use std::collections::HashMap;
use std::rc::Rc;

use rand::Rng;
use rand::rngs::StdRng;

use crate::common::{HarnessError, Result};

/// The conventional start symbol.
pub const START_SYMBOL: &str = "<start>";

/// Default cap on simultaneously open nonterminals.
pub const MAX_NONTERMINALS: usize = 10;

/// Default number of rejected expansions before giving up.
pub const MAX_EXPANSION_TRIALS: usize = 100;

/// A producer closure: consumes randomness, yields expansion text.
pub type ProduceFn = Rc<dyn Fn(&mut StdRng) -> String>;

/// One alternative of a rule.
#[derive(Clone)]
pub enum Expansion {
    /// Literal text, possibly containing nonterminals.
    Literal(String),
    /// A closure producing the text on demand.
    Call(ProduceFn),
}

/// The right-hand side of a grammar rule.
#[derive(Clone)]
pub enum Rule {
    /// Choose one alternative uniformly.
    Alternatives(Vec<Expansion>),
    /// Invoke the closure for the expansion.
    Produce(ProduceFn),
}

/// A nonterminal → rule table.
#[derive(Default)]
pub struct Grammar {
    rules: HashMap<String, Rule>,
}

impl Grammar {
    /// An empty grammar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a rule of literal alternatives.
    pub fn alts(&mut self, symbol: &str, alternatives: &[&str]) {
        self.rules.insert(
            symbol.to_string(),
            Rule::Alternatives(
                alternatives
                    .iter()
                    .map(|a| Expansion::Literal((*a).to_string()))
                    .collect(),
            ),
        );
    }

    /// Installs a rule with explicit (possibly mixed) alternatives.
    pub fn rule(&mut self, symbol: &str, alternatives: Vec<Expansion>) {
        self.rules
            .insert(symbol.to_string(), Rule::Alternatives(alternatives));
    }

    /// Installs a producer rule.
    pub fn produce(&mut self, symbol: &str, f: impl Fn(&mut StdRng) -> String + 'static) {
        self.rules
            .insert(symbol.to_string(), Rule::Produce(Rc::new(f)));
    }

    fn get(&self, symbol: &str) -> Result<&Rule> {
        self.rules
            .get(symbol)
            .ok_or_else(|| HarnessError::Expansion(format!("no rule for {symbol}")))
    }
}

/// Returns every nonterminal occurrence in `term`, duplicates included.
///
/// A nonterminal is `<...>` with no space or nesting inside.
pub fn nonterminals(term: &str) -> Vec<&str> {
    let bytes = term.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            let mut j = i + 1;
            while j < bytes.len() && !matches!(bytes[j], b'<' | b'>' | b' ') {
                j += 1;
            }
            if j < bytes.len() && bytes[j] == b'>' {
                found.push(&term[i..=j]);
                i = j + 1;
                continue;
            }
        }
        i += 1;
    }
    found
}

/// Expands `<start>` with the default caps.
pub fn expand(grammar: &Grammar, rng: &mut StdRng) -> Result<String> {
    expand_from(grammar, START_SYMBOL, MAX_NONTERMINALS, MAX_EXPANSION_TRIALS, rng)
}

/// Expands `start_symbol` until no nonterminal remains.
///
/// Each step a random nonterminal occurrence is selected and the first
/// occurrence of its symbol is substituted. Candidate substitutions that
/// would leave `max_nonterminals` or more open nonterminals are rejected
/// and retried; after `max_expansion_trials` consecutive rejections the
/// expansion fails. On success the result contains zero nonterminals.
pub fn expand_from(
    grammar: &Grammar,
    start_symbol: &str,
    max_nonterminals: usize,
    max_expansion_trials: usize,
    rng: &mut StdRng,
) -> Result<String> {
    let mut term = start_symbol.to_string();
    let mut expansion_trials = 0;

    loop {
        let open = nonterminals(&term);
        if open.is_empty() {
            return Ok(term);
        }

        let symbol = open[rng.random_range(0..open.len())].to_string();
        let expansion = match grammar.get(&symbol)? {
            Rule::Produce(f) => f(rng),
            Rule::Alternatives(alternatives) => {
                match &alternatives[rng.random_range(0..alternatives.len())] {
                    Expansion::Literal(text) => text.clone(),
                    Expansion::Call(f) => f(rng),
                }
            }
        };

        let new_term = term.replacen(&symbol, &expansion, 1);

        if nonterminals(&new_term).len() < max_nonterminals {
            term = new_term;
            expansion_trials = 0;
        } else {
            expansion_trials += 1;
            if expansion_trials >= max_expansion_trials {
                return Err(HarnessError::Expansion(term));
            }
        }
    }
}
