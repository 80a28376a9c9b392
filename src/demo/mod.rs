//! Canned synthesis scenarios: one constructor per end-to-end scenario this
//! crate is tested against, shared between the `circuit_synth` binary's
//! subcommands and the integration tests.
//!
//! Each constructor takes a [`NodeLibrary`] (so the caller owns the `Context`
//! / `SolverCtx` / `TransitionSystem` triple, per [`crate::run`]'s doc
//! comment on why that triple isn't bundled into a struct) and returns a
//! ready-to-run [`CircuitProblem`].

use std::rc::Rc;

use z3::ast::{Ast, BV};

use crate::error::Result;
use crate::nodes::{NodeLibrary, ParamValue, Params};
use crate::synth::SpecFn;
use crate::CircuitProblem;

fn int_params(entries: &[(&str, i64)]) -> Params {
    entries.iter().map(|(k, v)| (k.to_string(), ParamValue::Int(*v))).collect()
}

/// Scenario A: a two-input adder pipelined through a register. The spec
/// sums the current and previous cycle's single input, modulo the circuit's
/// width (the `bvadd` wraps automatically for a 2-bit sum).
pub fn two_input_adder<'ctx>(lib: &NodeLibrary<'ctx>) -> Result<CircuitProblem<'ctx>> {
    let add = lib.add(int_params(&[("N", 2), ("delay", 1)]))?;
    let register = lib.register(int_params(&[("N", 2), ("init", 0), ("setup", 0), ("hold", 0), ("output_delay", 0)]))?;

    let spec_func: SpecFn<'ctx> = Rc::new(|history: &[Vec<BV<'ctx>>], solver| {
        if history.len() < 2 {
            vec![solver.bv_lit(0, 2)]
        } else {
            let last = &history[history.len() - 1][0];
            let prev = &history[history.len() - 2][0];
            vec![last.bvadd(prev)]
        }
    });

    Ok(CircuitProblem {
        in_widths: vec![2],
        out_widths: vec![2],
        ops: vec![add, register],
        spec_func,
    })
}

/// Scenario B: a pipelined reduce. Four 4-bit inputs are available but the
/// spec only references the first two, summed two cycles back — a shape
/// meant to be realized with an adder fed by a pair of pipeline registers.
pub fn pipelined_reduce<'ctx>(lib: &NodeLibrary<'ctx>) -> Result<CircuitProblem<'ctx>> {
    let add = lib.add(int_params(&[("N", 4), ("delay", 1)]))?;
    let reg_a = lib.register(int_params(&[("N", 4), ("init", 0), ("setup", 0), ("hold", 0), ("output_delay", 1)]))?;
    let reg_b = lib.register(int_params(&[("N", 4), ("init", 0), ("setup", 0), ("hold", 0), ("output_delay", 1)]))?;

    let spec_func: SpecFn<'ctx> = Rc::new(|history: &[Vec<BV<'ctx>>], solver| {
        if history.len() < 3 {
            vec![solver.bv_lit(0, 4)]
        } else {
            let two_ago = &history[history.len() - 3];
            vec![two_ago[0].bvadd(&two_ago[1])]
        }
    });

    Ok(CircuitProblem {
        in_widths: vec![4, 4, 4, 4],
        out_widths: vec![4],
        ops: vec![add, reg_a, reg_b],
        spec_func,
    })
}

/// Asserts, as a single boolean term, that the last `sequence.len()` entries
/// of `history` equal `sequence` in order. Shared between the spec node's
/// own `eval_fn` and the scenario's oracle `spec_func`, which both need to
/// recognize the same window.
fn sequence_matches<'ctx>(solver: &crate::SolverCtx<'ctx>, history: &[Vec<BV<'ctx>>], sequence: &[i64], width: u32) -> BV<'ctx> {
    if history.len() < sequence.len() {
        return solver.bv_lit(0, 1);
    }
    let window = &history[history.len() - sequence.len()..];
    let equalities: Vec<_> = window
        .iter()
        .zip(sequence.iter())
        .map(|(cycle_inputs, &expected)| solver.eq_bv(&cycle_inputs[0], &solver.bv_lit(expected as u64, width)))
        .collect();
    crate::nodes::bool_to_bv1(solver, &solver.and_all(&equalities))
}

/// `SequenceDetector(N, sequence, setup, hold, delay)`: a user-defined spec
/// node whose single Moore output goes high once the last `sequence.len()`
/// input values matched `sequence`, in order.
fn sequence_detector<'ctx>(lib: &NodeLibrary<'ctx>, sequence: Vec<i64>, setup: i64, hold: i64, delay: i64) -> Result<crate::Node<'ctx>> {
    use crate::nodes::{NodeTypes, ParamKind, ParamSchema, SeqTiming};

    const SCHEMA: ParamSchema = ParamSchema(&[
        ("N", ParamKind::Int),
        ("sequence", ParamKind::IntTuple),
        ("setup", ParamKind::Int),
        ("hold", ParamKind::Int),
        ("delay", ParamKind::Int),
    ]);

    let n = 4u32;
    let params: Params = [
        ("N".to_string(), ParamValue::Int(n as i64)),
        ("sequence".to_string(), ParamValue::IntTuple(sequence)),
        ("setup".to_string(), ParamValue::Int(setup)),
        ("hold".to_string(), ParamValue::Int(hold)),
        ("delay".to_string(), ParamValue::Int(delay)),
    ]
    .into_iter()
    .collect();

    let types = NodeTypes {
        inputs: vec![n],
        outputs: vec![1],
    };

    let eval_fn: crate::nodes::SpecEvalFn<'ctx> = Rc::new(move |params: &Params, history: &[Vec<BV<'ctx>>], solver: &crate::SolverCtx<'ctx>| {
        let sequence = params.get("sequence").and_then(ParamValue::as_tuple).expect("validated by schema").to_vec();
        let n = params.get("N").and_then(ParamValue::as_int).expect("validated by schema") as u32;
        vec![sequence_matches(solver, history, &sequence, n)]
    });

    let timing_fn: crate::nodes::SpecTimingFn<'ctx> = Rc::new(move |params: &Params, delays: &[BV<'ctx>]| {
        let setup_param = params.get("setup").and_then(ParamValue::as_int).expect("validated by schema");
        let hold_param = params.get("hold").and_then(ParamValue::as_int).expect("validated by schema");
        let delay_param = params.get("delay").and_then(ParamValue::as_int).expect("validated by schema");
        let delay_width = delays[0].get_size();
        SeqTiming {
            setup: vec![delays[0].bvadd(&BV::from_i64(delays[0].get_ctx(), setup_param, delay_width))],
            hold: vec![delays[0].bvsub(&BV::from_i64(delays[0].get_ctx(), hold_param, delay_width))],
            output_delay: vec![BV::from_i64(delays[0].get_ctx(), delay_param, delay_width)],
        }
    });

    lib.make_spec("SequenceDetector", &SCHEMA, params, types, eval_fn, timing_fn, vec![true])
}

/// Scenario C: a sequence detector gated through two pipeline registers, so
/// the circuit output lags the detector's Moore output by two cycles.
pub fn sequence_detector_scenario<'ctx>(lib: &NodeLibrary<'ctx>) -> Result<CircuitProblem<'ctx>> {
    let detector = sequence_detector(lib, vec![0, 2, 3], 1, 1, 2)?;
    let reg_a = lib.register(int_params(&[("N", 1), ("init", 0), ("setup", 0), ("hold", 0), ("output_delay", 0)]))?;
    let reg_b = lib.register(int_params(&[("N", 1), ("init", 0), ("setup", 0), ("hold", 0), ("output_delay", 0)]))?;

    let sequence = vec![0i64, 2, 3];
    let spec_func: SpecFn<'ctx> = Rc::new(move |history: &[Vec<BV<'ctx>>], solver| {
        let delay = 2usize;
        if history.len() <= delay {
            return vec![solver.bv_lit(0, 1)];
        }
        let delayed_history = &history[..history.len() - delay];
        vec![sequence_matches(solver, delayed_history, &sequence, 4)]
    });

    Ok(CircuitProblem {
        in_widths: vec![4],
        out_widths: vec![1],
        ops: vec![detector, reg_a, reg_b],
        spec_func,
    })
}

/// Scenario F: a single register whose output is the identity function
/// delayed by one cycle (`init` at cycle 0, `input@0` at cycle 1, ...).
pub fn register_identity<'ctx>(lib: &NodeLibrary<'ctx>, width: u32, init: i64) -> Result<CircuitProblem<'ctx>> {
    let register = lib.register(int_params(&[("N", width as i64), ("init", init), ("setup", 0), ("hold", 0), ("output_delay", 0)]))?;

    let spec_func: SpecFn<'ctx> = Rc::new(move |history: &[Vec<BV<'ctx>>], solver| {
        if history.len() < 2 {
            vec![solver.bv_lit(init as u64, width)]
        } else {
            vec![history[history.len() - 2][0].clone()]
        }
    });

    Ok(CircuitProblem {
        in_widths: vec![width],
        out_widths: vec![width],
        ops: vec![register],
        spec_func,
    })
}

/// Scenario D: a circuit whose only operator produces 2-bit values but whose
/// declared output is 4 bits wide. No source of the required width exists,
/// so [`crate::encoding::CircuitEncoding::new`] itself returns
/// `SynthError::Type` — the "ill-formed, fatal" case distilled spec §4.2
/// calls out, rather than a CEGIS-reported "no solution".
pub fn unsolvable_by_width<'ctx>(lib: &NodeLibrary<'ctx>) -> Result<CircuitProblem<'ctx>> {
    let add = lib.add(int_params(&[("N", 2), ("delay", 0)]))?;
    let spec_func: SpecFn<'ctx> = Rc::new(|_history: &[Vec<BV<'ctx>>], solver| vec![solver.bv_lit(0, 4)]);
    Ok(CircuitProblem {
        in_widths: vec![2],
        out_widths: vec![4],
        ops: vec![add],
        spec_func,
    })
}

/// Scenario E: degenerate timing — `cycle_delay = 0` with a component that
/// has positive combinational delay, so no interconnect can meet the
/// setup bound at synthesize time.
pub fn degenerate_timing<'ctx>(lib: &NodeLibrary<'ctx>) -> Result<CircuitProblem<'ctx>> {
    let add = lib.add(int_params(&[("N", 2), ("delay", 3)]))?;
    let register = lib.register(int_params(&[("N", 2), ("init", 0), ("setup", 1), ("hold", 0), ("output_delay", 0)]))?;
    let spec_func: SpecFn<'ctx> = Rc::new(|history: &[Vec<BV<'ctx>>], solver| {
        if history.len() < 2 {
            vec![solver.bv_lit(0, 2)]
        } else {
            let last = &history[history.len() - 1][0];
            let prev = &history[history.len() - 2][0];
            vec![last.bvadd(prev)]
        }
    });
    Ok(CircuitProblem {
        in_widths: vec![2],
        out_widths: vec![2],
        ops: vec![add, register],
        spec_func,
    })
}
