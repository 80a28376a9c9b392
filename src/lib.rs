//! A program-synthesis engine for timed digital circuits.
//!
//! Given a library of parameterized hardware components (combinational,
//! sequential, and black-box behavioral "spec" nodes), input/output port
//! widths, a behavioral specification expressed as a function from
//! cycle-indexed input histories to cycle-indexed output histories, and
//! optional timing constraints, this crate synthesizes a loop-free
//! interconnect between component ports that makes the resulting circuit
//! behave equivalently to the specification across a bounded unrolling
//! horizon, while satisfying timing if requested.
//!
//! # How it fits together
//!
//! 1. [`nodes`] publishes the component catalog (`Add`, `Register`, ...) and
//!    lets callers define their own black-box `SpecNode`s.
//! 2. [`encoding`] allocates line variables (lvars) for every port and emits
//!    the well-formed-program predicate.
//! 3. [`synth`] unrolls connectivity, state, and behavioral equivalence over
//!    a cycle horizon into `synth_base`/`synth_constrain`/`verify`.
//! 4. [`cegis`] drives the counterexample-guided synthesize/verify/refine
//!    loop to discharge those formulas against an incremental SMT backend.
//! 5. [`decode`] turns the winning assignment into an [`decode::Interconnect`].
//!
//! [`solver`] and [`unroller`] are the plumbing everything above sits on: a
//! façade over `z3`, and a from-scratch transition-system/unroller pairing.
//! [`demo`] wires the whole pipeline into the canned scenarios exercised by
//! the `circuit_synth` binary and this crate's integration tests.

use std::cell::RefCell;
use std::rc::Rc;

use z3::Context;

pub mod cegis;
pub mod decode;
pub mod demo;
pub mod encoding;
pub mod error;
pub mod nodes;
pub mod solver;
pub mod synth;
pub mod unroller;

pub use decode::Interconnect;
pub use error::{Result, SynthError};
pub use nodes::{Node, NodeLibrary, ParamValue, Params};
pub use solver::SolverCtx;
pub use synth::SynthConfig;
pub use unroller::TransitionSystem;

/// Everything [`run`] needs to describe one synthesis problem: the circuit's
/// port widths, the operator list drawn from a [`NodeLibrary`], and the
/// behavioral specification the synthesized circuit must match.
pub struct CircuitProblem<'ctx> {
    pub in_widths: Vec<u32>,
    pub out_widths: Vec<u32>,
    pub ops: Vec<Node<'ctx>>,
    pub spec_func: synth::SpecFn<'ctx>,
}

/// Runs one synthesis problem to completion: builds the circuit encoding,
/// the synthesis formulas, and drives CEGIS. Returns `None` if no
/// interconnect satisfies the specification within the given horizon (and,
/// in timing mode, the given timing budget) — this is a normal outcome, not
/// an error (see [`error::SynthError`]).
pub fn run<'ctx>(
    solver: &SolverCtx<'ctx>,
    ts: Rc<RefCell<TransitionSystem<'ctx>>>,
    delay_width: u32,
    problem: CircuitProblem<'ctx>,
    config: SynthConfig,
) -> Result<Option<Interconnect>> {
    let input_delays = config.input_delays(problem.in_widths.len());
    let encoding = encoding::CircuitEncoding::new(
        solver,
        ts.clone(),
        delay_width,
        problem.in_widths,
        problem.out_widths,
        problem.ops,
        input_delays,
    )?;

    let ts_ref = ts.borrow();
    let unroller = unroller::Unroller::new(solver, &*ts_ref);
    let synthesis = synth::build(solver, &unroller, &encoding, &config, &problem.spec_func)?;
    drop(unroller);
    drop(ts_ref);

    match cegis::run(solver, &synthesis)? {
        Some(assignment) => Ok(Some(Interconnect::decode(&encoding, &assignment)?)),
        None => Ok(None),
    }
}

/// A `Context` configured for incremental, model-producing use, paired with
/// the `SolverCtx` façade built on top of it. Every synthesis session starts
/// here; kept as a free function rather than a struct because the
/// `'ctx`-parameterized types downstream (`NodeLibrary`, `CircuitEncoding`,
/// ...) all need to borrow the same `Context` for the same lifetime, which a
/// wrapper struct cannot express without self-referential borrows.
pub fn new_context() -> Context {
    Context::new(&solver::default_config())
}
