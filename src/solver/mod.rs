//! Thin adaptor over the SMT backend.
//!
//! Everything above this module talks to bit-vector and boolean terms through
//! [`SolverCtx`]; nothing else in the crate imports `z3` directly. This keeps
//! the backend swappable in principle, and gives the rest of the codebase a
//! vocabulary ("sort", "term", "symbol") that matches the solver contract
//! described for the synthesis core rather than `z3`'s own naming.
//!
//! The façade is deliberately narrow: sort/term construction, `push`/`pop`,
//! assertion, `check_sat`, model extraction, and substitution. Nothing here
//! knows about circuits, nodes, or CEGIS.

use std::collections::HashMap;

use z3::ast::{Ast, Bool, Dynamic, BV};
use z3::{Config, Context, SatResult, Solver as Z3Solver};

use crate::error::{Result, SynthError};

/// A sort a term can have. The core only ever needs booleans and fixed-width
/// bit-vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Bool,
    Bv(u32),
}

impl Width {
    pub fn bv(width: u32) -> Self {
        Width::Bv(width)
    }

    /// Bit-vector width required to represent up to `num_values - 1`.
    pub fn lvar_width(num_values: u64) -> u32 {
        if num_values <= 1 {
            1
        } else {
            (64 - (num_values - 1).leading_zeros()).max(1)
        }
    }
}

/// Owns the `z3::Context` and the incremental solver stack used by the CEGIS
/// driver. All terms produced through this façade borrow `'ctx`.
pub struct SolverCtx<'ctx> {
    ctx: &'ctx Context,
    solver: Z3Solver<'ctx>,
}

impl<'ctx> SolverCtx<'ctx> {
    /// Creates a context configured for incremental use with model production,
    /// the two preconditions the solver contract requires.
    pub fn new(ctx: &'ctx Context) -> Self {
        let solver = Z3Solver::new(ctx);
        SolverCtx { ctx, solver }
    }

    pub fn context(&self) -> &'ctx Context {
        self.ctx
    }

    // -- term construction -------------------------------------------------

    pub fn bool_const(&self, name: &str) -> Bool<'ctx> {
        Bool::new_const(self.ctx, name)
    }

    pub fn bv_const(&self, name: &str, width: u32) -> BV<'ctx> {
        BV::new_const(self.ctx, name, width)
    }

    /// Allocates a symbol of the given sort. Mirrors the solver contract's
    /// `make_symbol(name, sort)`.
    pub fn make_symbol(&self, name: &str, sort: Width) -> Dynamic<'ctx> {
        match sort {
            Width::Bool => Dynamic::from_ast(&self.bool_const(name)),
            Width::Bv(w) => Dynamic::from_ast(&self.bv_const(name, w)),
        }
    }

    pub fn bv_lit(&self, value: u64, width: u32) -> BV<'ctx> {
        BV::from_u64(self.ctx, value, width)
    }

    /// A bit-vector literal interpreted as a signed two's-complement value.
    /// Used for timing bounds, where hold subtraction can go negative.
    pub fn bv_lit_signed(&self, value: i64, width: u32) -> BV<'ctx> {
        BV::from_i64(self.ctx, value, width)
    }

    pub fn bool_lit(&self, value: bool) -> Bool<'ctx> {
        Bool::from_bool(self.ctx, value)
    }

    pub fn ite(&self, cond: &Bool<'ctx>, then_term: &Dynamic<'ctx>, else_term: &Dynamic<'ctx>) -> Dynamic<'ctx> {
        cond.ite(then_term, else_term)
    }

    pub fn eq_dynamic(&self, a: &Dynamic<'ctx>, b: &Dynamic<'ctx>) -> Bool<'ctx> {
        a._eq(b)
    }

    pub fn eq_bv(&self, a: &BV<'ctx>, b: &BV<'ctx>) -> Bool<'ctx> {
        a._eq(b)
    }

    // -- reduction builders --------------------------------------------------

    /// Conjunction that short-circuits the empty case to `true` instead of
    /// emitting a degenerate nullary `and`.
    pub fn and_all(&self, terms: &[Bool<'ctx>]) -> Bool<'ctx> {
        match terms {
            [] => self.bool_lit(true),
            [single] => single.clone(),
            many => Bool::and(self.ctx, &many.iter().collect::<Vec<_>>()),
        }
    }

    /// Disjunction that short-circuits the empty case to `false`.
    pub fn or_all(&self, terms: &[Bool<'ctx>]) -> Bool<'ctx> {
        match terms {
            [] => self.bool_lit(false),
            [single] => single.clone(),
            many => Bool::or(self.ctx, &many.iter().collect::<Vec<_>>()),
        }
    }

    // -- incremental solving --------------------------------------------------

    pub fn push(&self) {
        self.solver.push();
    }

    pub fn pop(&self, n: u32) {
        self.solver.pop(n);
    }

    pub fn assert_formula(&self, formula: &Bool<'ctx>) {
        self.solver.assert(formula);
    }

    pub fn check_sat(&self) -> Result<bool> {
        let start = std::time::Instant::now();
        let result = self.solver.check();
        tracing::trace!(elapsed_ms = start.elapsed().as_millis() as u64, ?result, "check_sat");
        match result {
            SatResult::Sat => Ok(true),
            SatResult::Unsat => Ok(false),
            SatResult::Unknown => Err(SynthError::Solver(
                self.solver
                    .get_reason_unknown()
                    .unwrap_or_else(|| "solver returned unknown".to_string()),
            )),
        }
    }

    /// Reads the value the last satisfying model assigns to `term`. Must only
    /// be called immediately after a `Sat` result from [`Self::check_sat`].
    pub fn get_value_bv(&self, term: &BV<'ctx>) -> Result<u64> {
        let model = self
            .solver
            .get_model()
            .ok_or_else(|| SynthError::Solver("no model available".to_string()))?;
        let value = model
            .eval(term, true)
            .ok_or_else(|| SynthError::Solver("term has no value in model".to_string()))?;
        value
            .as_u64()
            .ok_or_else(|| SynthError::Solver("bit-vector value did not simplify to a literal".to_string()))
    }

    pub fn get_value_bool(&self, term: &Bool<'ctx>) -> Result<bool> {
        let model = self
            .solver
            .get_model()
            .ok_or_else(|| SynthError::Solver("no model available".to_string()))?;
        let value = model
            .eval(term, true)
            .ok_or_else(|| SynthError::Solver("term has no value in model".to_string()))?;
        value
            .as_bool()
            .ok_or_else(|| SynthError::Solver("boolean value did not simplify to a literal".to_string()))
    }

    /// Substitutes every key in `mapping` with its paired value throughout
    /// `formula`, producing a fresh term. This is the only operation the
    /// CEGIS driver needs beyond push/pop/assert/check/get-value/make-symbol.
    pub fn substitute_bool(&self, formula: &Bool<'ctx>, mapping: &[(Dynamic<'ctx>, Dynamic<'ctx>)]) -> Bool<'ctx> {
        let pairs: Vec<(&Dynamic<'ctx>, &Dynamic<'ctx>)> = mapping.iter().map(|(k, v)| (k, v)).collect();
        formula.substitute(&pairs)
    }

    /// Sort-agnostic substitution, for renaming free symbols inside a
    /// bit-vector term (which may itself be a compound expression, not just a
    /// bare symbol — an interconnect mux, for instance).
    pub fn substitute_dynamic(&self, term: &Dynamic<'ctx>, mapping: &[(Dynamic<'ctx>, Dynamic<'ctx>)]) -> Dynamic<'ctx> {
        let pairs: Vec<(&Dynamic<'ctx>, &Dynamic<'ctx>)> = mapping.iter().map(|(k, v)| (k, v)).collect();
        term.substitute(&pairs)
    }
}

/// Convenience: builds a fresh `(from, to)` substitution pair from two
/// dynamic terms, keyed by their original names. Used by the CEGIS driver
/// when assembling the `A_vals ∪ {D → fresh D'}` mapping.
pub fn subst_pairs<'ctx>(mapping: &HashMap<String, Dynamic<'ctx>>, symbols: &HashMap<String, Dynamic<'ctx>>) -> Vec<(Dynamic<'ctx>, Dynamic<'ctx>)> {
    mapping
        .iter()
        .filter_map(|(name, value)| symbols.get(name).map(|sym| (sym.clone(), value.clone())))
        .collect()
}

/// A context factory matching the `z3::Config` boilerplate the rest of the
/// crate needs once, at the top of `main`/`demo` entry points.
pub fn default_config() -> Config {
    let mut cfg = Config::new();
    cfg.set_model_generation(true);
    cfg
}
