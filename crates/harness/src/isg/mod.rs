//! Instruction stream generation.
//!
//! Random RISC-V program synthesis, organized as:
//! 1. **Grammar engine:** Bounded random expansion of context-free rule
//!    tables ([`grammar`]).
//! 2. **Helpers:** Scoped register allocation, label promises, immediate
//!    draws ([`alloc`]).
//! 3. **Generators:** The base-integer generator ([`rv`]) and the vector
//!    generator ([`rvv`]), both implementing [`ProgramGenerator`].
//! 4. **Multiplexing:** [`MultiGenerator`] combines the enabled generators,
//!    concatenating their init/deinit fragments and picking one uniformly
//!    per payload fragment.

pub mod alloc;
pub mod grammar;
pub mod rv;
pub mod rvv;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::code::{CodeBlock, CodeFragment, CodeFragmentList};
use crate::common::Result;
use crate::config::Config;

pub use rv::RvGenerator;
pub use rvv::RvvGenerator;

/// A source of program fragments.
///
/// Implementations own their randomness; repeated calls advance their
/// internal state (labels, register bursts).
pub trait ProgramGenerator {
    /// Fragments placed before the payload (state restore, first label).
    fn gen_init_fragments(&mut self) -> Result<CodeFragmentList> {
        Ok(CodeFragmentList::new())
    }

    /// One payload fragment.
    fn gen_fragment(&mut self) -> Result<CodeFragment>;

    /// Fragments placed after the payload (label stubs).
    fn gen_deinit_fragments(&mut self) -> Result<CodeFragmentList> {
        Ok(CodeFragmentList::new())
    }
}

/// Uniform multiplexer over the enabled generators.
///
/// Init and deinit fragments of all generators are concatenated in
/// construction order; each payload fragment comes from one generator
/// chosen uniformly at random.
pub struct MultiGenerator {
    generators: Vec<Box<dyn ProgramGenerator>>,
    rng: StdRng,
}

impl MultiGenerator {
    /// The generator set for a campaign: base integer, plus vector when
    /// the `v` extension is enabled.
    pub fn for_config(config: &Config) -> Result<Self> {
        let mut generators: Vec<Box<dyn ProgramGenerator>> =
            vec![Box::new(RvGenerator::new(config)?)];
        if config.isa.has_vector() {
            generators.push(Box::new(RvvGenerator::new(config)?));
        }
        Ok(Self {
            generators,
            rng: StdRng::from_os_rng(),
        })
    }

    /// A deterministic generator set for reproducible runs.
    pub fn for_config_seeded(config: &Config, seed: u64) -> Result<Self> {
        let mut generators: Vec<Box<dyn ProgramGenerator>> =
            vec![Box::new(RvGenerator::seeded(config, seed)?)];
        if config.isa.has_vector() {
            generators.push(Box::new(RvvGenerator::seeded(config, seed ^ 1)?));
        }
        Ok(Self {
            generators,
            rng: StdRng::seed_from_u64(seed ^ 2),
        })
    }

    /// A multiplexer over an explicit generator list.
    pub fn new(generators: Vec<Box<dyn ProgramGenerator>>) -> Self {
        Self {
            generators,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Generates a full code block with a uniformly drawn payload length.
    pub fn gen_block(&mut self, min_fragments: usize, max_fragments: usize) -> Result<CodeBlock> {
        let mut block = CodeBlock::new();

        block.init = self.gen_init_fragments()?;

        let count = self.rng.random_range(min_fragments..=max_fragments);
        for _ in 0..count {
            block.add(self.gen_fragment()?);
        }

        block.deinit = self.gen_deinit_fragments()?;
        Ok(block)
    }
}

impl ProgramGenerator for MultiGenerator {
    fn gen_init_fragments(&mut self) -> Result<CodeFragmentList> {
        let mut fragments = CodeFragmentList::new();
        for g in &mut self.generators {
            fragments.add_list(&g.gen_init_fragments()?);
        }
        Ok(fragments)
    }

    fn gen_fragment(&mut self) -> Result<CodeFragment> {
        let idx = self.rng.random_range(0..self.generators.len());
        self.generators[idx].gen_fragment()
    }

    fn gen_deinit_fragments(&mut self) -> Result<CodeFragmentList> {
        let mut fragments = CodeFragmentList::new();
        for g in &mut self.generators {
            fragments.add_list(&g.gen_deinit_fragments()?);
        }
        Ok(fragments)
    }
}
