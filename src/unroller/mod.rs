//! Transition system and temporal unrolling.
//!
//! The transition system owns state and input variables and the init/next
//! formulas that describe how state evolves; the unroller turns a single
//! symbolic formula into its per-cycle copy by renaming every state/input
//! variable to a `"{name}@{k}"` instance (and the paired "next" symbol of a
//! state variable to its `k+1` instance). Neither type knows anything about
//! circuits or nodes — they are the piece of plumbing the rest of the crate
//! is built on top of.

use std::cell::RefCell;
use std::collections::HashMap;

use z3::ast::{Ast, Bool, Dynamic, BV};

use crate::solver::{SolverCtx, Width};

#[derive(Debug, Clone)]
struct StateVar<'ctx> {
    name: String,
    sort: Width,
    symbol: Dynamic<'ctx>,
    next_symbol: Dynamic<'ctx>,
}

#[derive(Debug, Clone)]
struct InputVar<'ctx> {
    name: String,
    sort: Width,
    symbol: Dynamic<'ctx>,
}

/// Owns state/input variables and the formulas relating them.
///
/// `constrain_init` formulas accumulate as a conjunction; `assign_next`
/// formulas likewise accumulate the `trans` conjunction. Both are append-only:
/// nothing in the spec ever retracts a transition-system constraint.
pub struct TransitionSystem<'ctx> {
    solver: &'ctx SolverCtx<'ctx>,
    state_vars: Vec<StateVar<'ctx>>,
    input_vars: Vec<InputVar<'ctx>>,
    init_formulas: Vec<Bool<'ctx>>,
    trans_formulas: Vec<Bool<'ctx>>,
}

impl<'ctx> TransitionSystem<'ctx> {
    pub fn new(solver: &'ctx SolverCtx<'ctx>) -> Self {
        TransitionSystem {
            solver,
            state_vars: Vec::new(),
            input_vars: Vec::new(),
            init_formulas: Vec::new(),
            trans_formulas: Vec::new(),
        }
    }

    /// Registers a free (cycle-indexed, universally quantified) input.
    pub fn make_inputvar(&mut self, name: &str, sort: Width) -> Dynamic<'ctx> {
        let symbol = self.solver.make_symbol(name, sort);
        self.input_vars.push(InputVar {
            name: name.to_string(),
            sort,
            symbol: symbol.clone(),
        });
        symbol
    }

    /// Registers a state variable and its paired "next" symbol. The state
    /// variable's evolution must later be pinned with [`Self::assign_next`].
    pub fn make_statevar(&mut self, name: &str, sort: Width) -> Dynamic<'ctx> {
        let symbol = self.solver.make_symbol(name, sort);
        let next_symbol = self.solver.make_symbol(&format!("{name}.next"), sort);
        self.state_vars.push(StateVar {
            name: name.to_string(),
            sort,
            symbol: symbol.clone(),
            next_symbol,
        });
        symbol
    }

    pub fn constrain_init(&mut self, formula: Bool<'ctx>) {
        self.init_formulas.push(formula);
    }

    /// Pins `state`'s next-cycle value to `next_expr`, contributing
    /// `state.next == next_expr` to `trans`.
    pub fn assign_next(&mut self, state: &Dynamic<'ctx>, next_expr: Dynamic<'ctx>) {
        let state_name = state.to_string();
        let entry = self
            .state_vars
            .iter()
            .find(|sv| sv.symbol.to_string() == state_name)
            .expect("assign_next called on a symbol that is not a registered state variable");
        let eq = entry.next_symbol._eq(&next_expr);
        self.trans_formulas.push(eq);
    }

    pub fn init(&self) -> Bool<'ctx> {
        self.solver.and_all(&self.init_formulas)
    }

    pub fn trans(&self) -> Bool<'ctx> {
        self.solver.and_all(&self.trans_formulas)
    }
}

/// Produces per-cycle copies of terms built over a [`TransitionSystem`].
///
/// `at_time(term, k)` substitutes every state/input symbol with its `k`-th
/// cycle copy; a state variable's `next` symbol (as it appears inside
/// `trans`) is substituted with the variable's *own* `k+1` copy, which is how
/// `trans@k` links cycle `k` to cycle `k+1`.
pub struct Unroller<'ctx, 'ts> {
    solver: &'ctx SolverCtx<'ctx>,
    ts: &'ts TransitionSystem<'ctx>,
    cache: RefCell<HashMap<(String, u64), Dynamic<'ctx>>>,
}

impl<'ctx, 'ts> Unroller<'ctx, 'ts> {
    pub fn new(solver: &'ctx SolverCtx<'ctx>, ts: &'ts TransitionSystem<'ctx>) -> Self {
        Unroller {
            solver,
            ts,
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn ts(&self) -> &TransitionSystem<'ctx> {
        self.ts
    }

    fn copy_of(&self, name: &str, sort: Width, time: u64) -> Dynamic<'ctx> {
        let key = (name.to_string(), time);
        if let Some(existing) = self.cache.borrow().get(&key) {
            return existing.clone();
        }
        let copy = self.solver.make_symbol(&format!("{name}@{time}"), sort);
        self.cache.borrow_mut().insert(key, copy.clone());
        copy
    }

    /// Builds the substitution renaming every registered state/input symbol
    /// to its cycle-`time` copy, and every state variable's `next` symbol to
    /// its cycle-`time + 1` copy.
    fn mapping_at(&self, time: u64) -> Vec<(Dynamic<'ctx>, Dynamic<'ctx>)> {
        let ts = self.ts();
        let mut mapping: Vec<(Dynamic<'ctx>, Dynamic<'ctx>)> = Vec::new();
        for sv in &ts.state_vars {
            mapping.push((sv.symbol.clone(), self.copy_of(&sv.name, sv.sort, time)));
            mapping.push((sv.next_symbol.clone(), self.copy_of(&sv.name, sv.sort, time + 1)));
        }
        for iv in &ts.input_vars {
            mapping.push((iv.symbol.clone(), self.copy_of(&iv.name, iv.sort, time)));
        }
        mapping
    }

    /// Renames every state/input variable appearing free in `term` to its
    /// cycle-`time` copy, and every state variable's `next` symbol to its
    /// cycle-`time + 1` copy.
    pub fn at_time(&self, term: &Bool<'ctx>, time: u64) -> Bool<'ctx> {
        let mapping = self.mapping_at(time);
        self.solver.substitute_bool(term, &mapping)
    }

    /// [`Self::at_time`] for a bit-vector-sorted term. `original` may be a
    /// bare registered symbol or a compound expression built over several of
    /// them (an interconnect mux selecting among port values, for instance);
    /// substitution renames every free occurrence either way.
    pub fn var_at_time(&self, original: &Dynamic<'ctx>, time: u64) -> Dynamic<'ctx> {
        let mapping = self.mapping_at(time);
        self.solver.substitute_dynamic(original, &mapping)
    }

    /// [`Self::var_at_time`] specialized to bit-vector terms, which is every
    /// port/state/spec-output variable in this crate's encoding.
    pub fn bv_at_time(&self, original: &BV<'ctx>, time: u64) -> BV<'ctx> {
        self.var_at_time(&Dynamic::from_ast(original), time)
            .as_bv()
            .expect("bv_at_time called on a term that was not a bit-vector")
    }

    /// The transition system's `init` formula, for unrolling at cycle 0.
    pub fn ts_init(&self) -> Bool<'ctx> {
        self.ts.init()
    }

    /// The transition system's `trans` formula, for unrolling at each cycle
    /// in `[0, num_cycles)`.
    pub fn ts_trans(&self) -> Bool<'ctx> {
        self.ts.trans()
    }
}
