//! Synthesis encoder: unrolls connectivity, state, and specification
//! equivalence over a cycle horizon, layers timing on request, and combines
//! the result into the three formulas the CEGIS driver consumes —
//! `synth_base`, `synth_constrain`, and `verify`.
//!
//! `num_cycles` is the highest cycle index unrolled, not a count: a circuit is
//! exercised over cycles `0..=num_cycles`, so `num_cycles = 1` covers two
//! cycles (`0` and `1`). This matches the literal range in the formulas below
//! (`t ∈ [0, num_cycles]` for connectivity/spec, `t ∈ [0, num_cycles)` for
//! `trans`) rather than reading "num_cycles" as a cycle count.

use std::rc::Rc;

use z3::ast::{Ast, Bool, BV};

use crate::encoding::CircuitEncoding;
use crate::error::{Result, SynthError};
use crate::solver::SolverCtx;
use crate::unroller::Unroller;

/// A user-provided behavioral specification: given the history of circuit
/// input tuples from cycle 0 through the current cycle, returns the expected
/// circuit outputs for the current cycle. May return a vacuous (e.g. all-zero)
/// output when the history is too short to pin down real behavior — callers
/// must do so explicitly, the encoder does not special-case short histories.
pub type SpecFn<'ctx> = Rc<dyn Fn(&[Vec<BV<'ctx>>], &SolverCtx<'ctx>) -> Vec<BV<'ctx>>>;

/// Recognized options of the synthesis encoder (distilled spec §6's
/// configuration table), validated at construction rather than deep inside
/// formula assembly.
#[derive(Clone)]
pub struct SynthConfig {
    pub num_cycles: u64,
    timing: Option<TimingConfig>,
}

#[derive(Clone)]
struct TimingConfig {
    input_delays: Vec<i64>,
    cycle_delay: i64,
    max_output_delays: Vec<i64>,
}

impl SynthConfig {
    pub fn new(num_cycles: u64) -> Self {
        SynthConfig {
            num_cycles,
            timing: None,
        }
    }

    /// Enables timing mode. `input_delays` defaults to all-zero when `None`.
    /// Lengths are validated against the circuit's port counts by
    /// [`SynthesisEncoder::new`], since the encoder is the first place both
    /// the config and the circuit's widths are in scope together.
    pub fn with_timing(mut self, input_delays: Option<Vec<i64>>, cycle_delay: i64, max_output_delays: Vec<i64>) -> Self {
        self.timing = Some(TimingConfig {
            input_delays: input_delays.unwrap_or_default(),
            cycle_delay,
            max_output_delays,
        });
        self
    }

    pub fn enforce_timing(&self) -> bool {
        self.timing.is_some()
    }

    pub fn input_delays(&self, num_inputs: usize) -> Option<Vec<i64>> {
        self.timing.as_ref().map(|t| {
            if t.input_delays.is_empty() {
                vec![0; num_inputs]
            } else {
                t.input_delays.clone()
            }
        })
    }
}

/// The three formulas the CEGIS driver discharges, plus the flattened E/A/D
/// variable sets the driver operates on. `a` and `d` hold one copy per
/// registered variable *per cycle*, since both the adversarial input trace
/// and the behavioral pins vary with time; `e` has no time dimension — the
/// interconnect is chosen once, not per cycle.
pub struct Synthesis<'ctx> {
    pub synth_base: Bool<'ctx>,
    pub synth_constrain: Bool<'ctx>,
    pub verify: Bool<'ctx>,
    pub e: Vec<BV<'ctx>>,
    pub a: Vec<BV<'ctx>>,
    pub d: Vec<BV<'ctx>>,
}

fn history_upto<'ctx>(unroller: &Unroller<'ctx, '_>, ports: &[BV<'ctx>], upto: u64) -> Vec<Vec<BV<'ctx>>> {
    (0..=upto)
        .map(|t| ports.iter().map(|p| unroller.bv_at_time(p, t)).collect())
        .collect()
}

/// Builds `synth_base`/`synth_constrain`/`verify` for a given circuit
/// encoding, horizon, and behavioral spec.
pub fn build<'ctx>(
    solver: &SolverCtx<'ctx>,
    unroller: &Unroller<'ctx, '_>,
    encoding: &CircuitEncoding<'ctx>,
    config: &SynthConfig,
    spec_func: &SpecFn<'ctx>,
) -> Result<Synthesis<'ctx>> {
    let num_cycles = config.num_cycles;

    // -- synth_base: P_wfp, plus timing discipline if requested -----------
    let mut base_terms = vec![encoding.p_wfp()];
    if config.enforce_timing() {
        let timing = config.timing.as_ref().expect("enforce_timing implies timing config");
        if timing.max_output_delays.len() != encoding.num_outputs {
            return Err(SynthError::Config(format!(
                "max_output_delays has {} entries, circuit has {} outputs",
                timing.max_output_delays.len(),
                encoding.num_outputs
            )));
        }
        base_terms.push(encoding.p_conn_delays()?);

        let delay_width = encoding.delay_width;

        let mut timing_terms = Vec::new();
        for setup in &encoding.setups {
            let bound = solver.bv_lit_signed(timing.cycle_delay, delay_width);
            timing_terms.push(setup.bvsle(&bound));
        }
        for hold in &encoding.holds {
            let zero = solver.bv_lit_signed(0, delay_width);
            timing_terms.push(hold.bvsge(&zero));
        }
        for (delay, &bound) in encoding.output_delays.iter().zip(timing.max_output_delays.iter()) {
            let bound_term = solver.bv_lit_signed(bound, delay_width);
            timing_terms.push(delay.bvsle(&bound_term));
        }
        base_terms.push(solver.and_all(&timing_terms));
    }
    let synth_base = solver.and_all(&base_terms);

    // -- unrolled pieces ----------------------------------------------------
    let p_conn_vars = encoding.p_conn_vars()?;
    let mut conn_vars_terms = Vec::with_capacity(num_cycles as usize + 1);
    for t in 0..=num_cycles {
        conn_vars_terms.push(unroller.at_time(&p_conn_vars, t));
    }
    let p_conn_vars_all = solver.and_all(&conn_vars_terms);

    let p_state_all = {
        let mut terms = vec![unroller.at_time(&unroller.ts_init(), 0)];
        for t in 0..num_cycles {
            terms.push(unroller.at_time(&unroller.ts_trans(), t));
        }
        solver.and_all(&terms)
    };

    let mut spec_nodes_terms = Vec::new();
    for (i, op) in encoding.ops().iter().enumerate() {
        let crate::nodes::Node::Spec(spec) = op else { continue };
        for t in 0..=num_cycles {
            let history = history_upto(unroller, &encoding.op_input_vars[i], t);
            let result = spec.eval(&history, solver)?;
            for (j, value) in result.iter().enumerate() {
                let pinned = unroller.bv_at_time(&encoding.op_output_vars[i][j], t);
                spec_nodes_terms.push(solver.eq_bv(value, &pinned));
            }
        }
    }
    let p_spec_nodes_all = solver.and_all(&spec_nodes_terms);

    let mut spec_terms = Vec::new();
    for t in 0..=num_cycles {
        let history = history_upto(unroller, &encoding.input_vars, t);
        let expected = spec_func(&history, solver);
        if expected.len() != encoding.num_outputs {
            return Err(SynthError::Type(format!(
                "spec function returned {} outputs, circuit has {}",
                expected.len(),
                encoding.num_outputs
            )));
        }
        for (out_value, exp_value) in encoding.output_vars.iter().zip(expected.iter()) {
            let pinned = unroller.bv_at_time(out_value, t);
            spec_terms.push(solver.eq_bv(&pinned, exp_value));
        }
    }
    let p_spec_all = solver.and_all(&spec_terms);

    let synth_constrain = solver.and_all(&[p_conn_vars_all.clone(), p_state_all.clone(), p_spec_all.clone(), p_spec_nodes_all.clone()]);

    let antecedent = solver.and_all(&[synth_base.clone(), p_conn_vars_all, p_state_all, p_spec_nodes_all]);
    let verify = solver.or_all(&[antecedent.not(), p_spec_all]);

    // -- variable partition, flattened across the horizon --------------------
    let partition = encoding.partition();

    let mut a = Vec::new();
    for t in 0..=num_cycles {
        for var in &partition.a {
            a.push(unroller.bv_at_time(var, t));
        }
    }

    let mut d = Vec::new();
    for t in 0..=num_cycles {
        for var in &partition.d {
            d.push(unroller.bv_at_time(var, t));
        }
    }

    Ok(Synthesis {
        synth_base,
        synth_constrain,
        verify,
        e: partition.e,
        a,
        d,
    })
}
