//! Assembly fragment containers.
//!
//! Generated programs are handled as trees of text fragments rather than flat
//! strings so that the reducer and the coverage-guided loop can slice, splice
//! and persist them without re-parsing assembly. It provides:
//! 1. **`CodeFragment`:** An opaque assembly text blob with substring
//!    replacement and line statistics.
//! 2. **`CodeFragmentList`:** An ordered fragment sequence with slicing.
//! 3. **`CodeBlock`:** The (init, main, deinit) triple every test program is
//!    built from; only `main` is subject to reduction.
//! 4. **Persistence:** Stable JSON round-trip via serde, exact on fragment
//!    text and ordering, so seed programs survive across campaigns.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::Result;

/// Aggregated line statistics over fragments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodeStats {
    /// Number of fragments.
    pub fragments: u64,
    /// Number of text lines.
    pub lines: u64,
    /// Number of non-blank lines (counted as instructions).
    pub ins: u64,
    /// Number of lines whose first non-space character is `v`
    /// (counted as vector instructions).
    pub vins: u64,
}

impl CodeStats {
    /// Accumulates another statistics block into this one.
    pub fn add(&mut self, other: &CodeStats) {
        self.fragments += other.fragments;
        self.lines += other.lines;
        self.ins += other.ins;
        self.vins += other.vins;
    }
}

impl fmt::Display for CodeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#fragments:   {}", self.fragments)?;
        writeln!(f, "#lines:       {}", self.lines)?;
        writeln!(f, "#ins:         {}", self.ins)?;
        writeln!(f, "#vins:        {}", self.vins)
    }
}

/// An opaque assembly source blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFragment {
    code: String,
}

impl CodeFragment {
    /// Wraps a piece of assembly text.
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    /// Replaces every occurrence of `old` with `new` in place.
    pub fn replace(&mut self, old: &str, new: &str) {
        self.code = self.code.replace(old, new);
    }

    /// The fragment text.
    pub fn as_code(&self) -> &str {
        &self.code
    }

    /// Line statistics of this fragment.
    pub fn stats(&self) -> CodeStats {
        let mut s = CodeStats {
            fragments: 1,
            ..CodeStats::default()
        };
        for line in self.code.split('\n') {
            s.lines += 1;
            let trimmed = line.trim_start();
            if !trimmed.is_empty() {
                s.ins += 1;
            }
            if trimmed.starts_with('v') {
                s.vins += 1;
            }
        }
        s
    }
}

impl fmt::Display for CodeFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

/// An ordered sequence of fragments; insertion order is significant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFragmentList {
    elements: Vec<CodeFragment>,
}

impl CodeFragmentList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// A list holding a single fragment.
    pub fn from_fragment(fragment: CodeFragment) -> Self {
        Self {
            elements: vec![fragment],
        }
    }

    /// Appends a fragment.
    pub fn add(&mut self, fragment: CodeFragment) {
        self.elements.push(fragment);
    }

    /// Appends all fragments of another list.
    pub fn add_list(&mut self, list: &CodeFragmentList) {
        self.elements.extend(list.elements.iter().cloned());
    }

    /// Inserts a fragment at `index`.
    pub fn insert(&mut self, index: usize, fragment: CodeFragment) {
        self.elements.insert(index, fragment);
    }

    /// Replaces every occurrence of `old` with `new` in all fragments.
    pub fn replace(&mut self, old: &str, new: &str) {
        for e in &mut self.elements {
            e.replace(old, new);
        }
    }

    /// The fragments in order.
    pub fn as_slice(&self) -> &[CodeFragment] {
        &self.elements
    }

    /// Number of fragments.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when the list holds no fragments.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The fragments joined by newlines.
    pub fn as_code(&self) -> String {
        self.elements
            .iter()
            .map(CodeFragment::as_code)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// A new list holding the fragments of `[begin, end)`.
    ///
    /// Out-of-range bounds are clamped to the list length.
    pub fn part(&self, begin: usize, end: usize) -> CodeFragmentList {
        let len = self.elements.len();
        let begin = begin.min(len);
        let end = end.min(len).max(begin);
        Self {
            elements: self.elements[begin..end].to_vec(),
        }
    }

    /// Aggregated statistics over all fragments.
    pub fn stats(&self) -> CodeStats {
        let mut s = CodeStats::default();
        for e in &self.elements {
            s.add(&e.stats());
        }
        s
    }
}

/// A complete test program body: initialization, payload, teardown.
///
/// `init` restores a machine state and sets up labels, `main` holds the
/// generated payload fragments, `deinit` fixes up promised labels. Reduction
/// only ever slices `main`; init and deinit are shared unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    /// State-restore and setup fragments.
    pub init: CodeFragmentList,
    /// The generated payload.
    pub main: CodeFragmentList,
    /// Teardown fragments (label stubs).
    pub deinit: CodeFragmentList,
}

impl CodeBlock {
    /// An empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a block from its JSON persistence format.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Saves the block in its JSON persistence format.
    ///
    /// The format is stable across runs: `load(save(b)) == b` exactly, on
    /// fragment text and ordering.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Appends a payload fragment.
    pub fn add(&mut self, fragment: CodeFragment) {
        self.main.add(fragment);
    }

    /// Replaces every occurrence of `old` with `new` across all three parts.
    pub fn replace(&mut self, old: &str, new: &str) {
        self.init.replace(old, new);
        self.main.replace(old, new);
        self.deinit.replace(old, new);
    }

    /// The full program text: init, main, deinit joined by newlines.
    pub fn as_code(&self) -> String {
        let mut ret = self.init.as_code();
        ret.push('\n');
        ret.push_str(&self.main.as_code());
        ret.push('\n');
        ret.push_str(&self.deinit.as_code());
        ret
    }

    /// Number of payload fragments.
    pub fn main_len(&self) -> usize {
        self.main.len()
    }

    /// A new block sharing init/deinit and taking `main[begin..end)`.
    pub fn part(&self, begin: usize, end: usize) -> CodeBlock {
        CodeBlock {
            init: self.init.clone(),
            main: self.main.part(begin, end),
            deinit: self.deinit.clone(),
        }
    }

    /// Statistics over the payload only.
    pub fn stats_main(&self) -> CodeStats {
        self.main.stats()
    }

    /// Statistics over the whole block.
    pub fn stats_all(&self) -> CodeStats {
        let mut s = self.stats_main();
        s.add(&self.init.stats());
        s.add(&self.deinit.stats());
        s
    }
}

impl fmt::Display for CodeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_code())
    }
}
