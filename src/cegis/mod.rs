//! Counterexample-guided inductive synthesis driver.
//!
//! Alternates synthesize/verify/refine over the three formulas the synthesis
//! encoder produces, using the solver's push/pop discipline as the sole
//! transactional primitive — every `push` paired with exactly one `pop` via
//! [`with_scope`], on every exit path including the early returns this loop
//! is full of. `S` (the running refinement conjunction) lives in
//! driver-local memory and is re-asserted from scratch each round, never
//! retracted from the solver itself.

use z3::ast::{Ast, Bool, Dynamic, BV};

use crate::error::Result;
use crate::solver::SolverCtx;
use crate::synth::Synthesis;

/// The existential assignment the driver converges on: every E-variable
/// (line variable) paired with the value the model chose for it.
pub type Assignment<'ctx> = Vec<(BV<'ctx>, u64)>;

fn with_scope<'ctx, T>(solver: &SolverCtx<'ctx>, body: impl FnOnce() -> Result<T>) -> Result<T> {
    solver.push();
    let result = body();
    solver.pop(1);
    result
}

fn read_values<'ctx>(solver: &SolverCtx<'ctx>, vars: &[BV<'ctx>]) -> Result<Vec<(BV<'ctx>, u64)>> {
    vars.iter().map(|v| solver.get_value_bv(v).map(|val| (v.clone(), val))).collect()
}

fn literal_mapping<'ctx>(solver: &SolverCtx<'ctx>, values: &[(BV<'ctx>, u64)]) -> Vec<(Dynamic<'ctx>, Dynamic<'ctx>)> {
    values
        .iter()
        .map(|(v, val)| (Dynamic::from_ast(v), Dynamic::from_ast(&solver.bv_lit(*val, v.get_size()))))
        .collect()
}

/// Runs the synthesize/verify/refine loop to completion.
///
/// Returns `Ok(Some(assignment))` once a candidate survives verification
/// under all inputs, `Ok(None)` if the underlying synthesis problem is
/// unsatisfiable (not an error — see [`crate::error::SynthError`]'s doc
/// comment on why "no solution" is not a variant there).
pub fn run<'ctx>(solver: &SolverCtx<'ctx>, synthesis: &Synthesis<'ctx>) -> Result<Option<Assignment<'ctx>>> {
    let mut s = solver.bool_lit(true);
    let mut round: u64 = 1;

    loop {
        tracing::debug!(round, e_vars = synthesis.e.len(), a_vars = synthesis.a.len(), d_vars = synthesis.d.len(), "cegis: synthesize");

        let e_vals = with_scope(solver, || {
            let goal = solver.and_all(&[synthesis.synth_base.clone(), s.clone()]);
            solver.assert_formula(&goal);
            if !solver.check_sat()? {
                return Ok(None);
            }
            read_values(solver, &synthesis.e).map(Some)
        })?;

        let Some(e_vals) = e_vals else {
            tracing::info!(round, "cegis: synthesize is UNSAT, no solution exists");
            return Ok(None);
        };

        let e_mapping = literal_mapping(solver, &e_vals);
        let candidate_verify = solver.substitute_bool(&synthesis.verify, &e_mapping);

        let a_vals = with_scope(solver, || {
            let refuted = candidate_verify.not();
            solver.assert_formula(&refuted);
            if !solver.check_sat()? {
                return Ok(None);
            }
            read_values(solver, &synthesis.a).map(Some)
        })?;

        let Some(a_vals) = a_vals else {
            tracing::info!(round, "cegis: verify is UNSAT under all inputs, candidate accepted");
            return Ok(Some(e_vals));
        };

        tracing::debug!(round, "cegis: refine, adversarial input trace found");

        let mut mapping = literal_mapping(solver, &a_vals);
        for d in &synthesis.d {
            let fresh = solver.bv_const(&format!("{d}@{round}"), d.get_size());
            mapping.push((Dynamic::from_ast(d), Dynamic::from_ast(&fresh)));
        }

        let refined = solver.substitute_bool(&synthesis.synth_constrain, &mapping);
        s = solver.and_all(&[s, refined]);
        round += 1;
    }
}
