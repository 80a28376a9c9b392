//! Circuit encoding: line variables, port value/delay variables, and the
//! well-formed-program predicate.
//!
//! A [`CircuitEncoding`] is built once per synthesis problem from a node list
//! and the circuit's input/output widths. It owns every lvar and port
//! variable, and exposes the variable partition (E/A/D) the CEGIS driver
//! needs as well as the predicate pieces ([`CircuitEncoding::p_wfp`],
//! [`CircuitEncoding::p_conn_vars`], [`CircuitEncoding::p_conn_delays`]) the
//! synthesis encoder assembles into `synth_base`/`synth_constrain`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use z3::ast::{Ast, Bool, BV};

use crate::error::{Result, SynthError};
use crate::nodes::Node;
use crate::solver::{SolverCtx, Width};
use crate::unroller::TransitionSystem;

/// The existential/universal/dependent variable split the CEGIS formulation
/// is built on. A first-class struct rather than an ad-hoc tuple, per the
/// design note on keeping the partition itself meaningful.
pub struct VariablePartition<'ctx> {
    /// What the synthesizer chooses: op-input lvars, op-output lvars, and
    /// circuit-output lvars.
    pub e: Vec<BV<'ctx>>,
    /// Circuit inputs, universally quantified per cycle.
    pub a: Vec<BV<'ctx>>,
    /// Per-port value variables, state variables, and spec-node output
    /// variables — pinned by the behavioral constraint, refreshed each CEGIS
    /// round.
    pub d: Vec<BV<'ctx>>,
}

pub struct CircuitEncoding<'ctx> {
    solver: &'ctx SolverCtx<'ctx>,
    ops: Vec<Node<'ctx>>,
    in_widths: Vec<u32>,
    out_widths: Vec<u32>,

    pub num_inputs: usize,
    pub num_outputs: usize,
    pub num_op_outputs: usize,
    pub num_lines: usize,
    pub lvar_width: u32,
    pub delay_width: u32,

    pub input_lvars: Vec<BV<'ctx>>,
    pub op_input_lvars: Vec<Vec<BV<'ctx>>>,
    pub op_output_lvars: Vec<Vec<BV<'ctx>>>,
    pub output_lvars: Vec<BV<'ctx>>,

    pub input_vars: Vec<BV<'ctx>>,
    pub op_input_vars: Vec<Vec<BV<'ctx>>>,
    pub op_output_vars: Vec<Vec<BV<'ctx>>>,
    pub output_vars: Vec<BV<'ctx>>,

    pub input_delays: Vec<BV<'ctx>>,
    pub op_input_delays: Vec<Vec<BV<'ctx>>>,
    pub op_output_delays: Vec<Vec<BV<'ctx>>>,
    pub output_delays: Vec<BV<'ctx>>,

    pub setups: Vec<BV<'ctx>>,
    pub holds: Vec<BV<'ctx>>,
}

impl<'ctx> CircuitEncoding<'ctx> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        solver: &'ctx SolverCtx<'ctx>,
        ts: Rc<RefCell<TransitionSystem<'ctx>>>,
        delay_width: u32,
        in_widths: Vec<u32>,
        out_widths: Vec<u32>,
        ops: Vec<Node<'ctx>>,
        input_delays: Option<Vec<i64>>,
    ) -> Result<Self> {
        let num_inputs = in_widths.len();
        let num_outputs = out_widths.len();
        let num_op_outputs: usize = ops.iter().map(|op| op.types().outputs.len()).sum();
        let num_lines = num_inputs + num_op_outputs;
        let lvar_width = Width::lvar_width(num_lines as u64);

        let input_lvars: Vec<BV<'ctx>> = (0..num_inputs).map(|i| solver.bv_lit(i as u64, lvar_width)).collect();

        let op_input_lvars: Vec<Vec<BV<'ctx>>> = ops
            .iter()
            .enumerate()
            .map(|(i, op)| {
                (0..op.types().inputs.len())
                    .map(|j| solver.bv_const(&format!("op_input_lvar[{i}][{j}]"), lvar_width))
                    .collect()
            })
            .collect();

        let op_output_lvars: Vec<Vec<BV<'ctx>>> = ops
            .iter()
            .enumerate()
            .map(|(i, op)| {
                (0..op.types().outputs.len())
                    .map(|j| solver.bv_const(&format!("op_output_lvar[{i}][{j}]"), lvar_width))
                    .collect()
            })
            .collect();

        let output_lvars: Vec<BV<'ctx>> = (0..num_outputs).map(|i| solver.bv_const(&format!("output_lvar[{i}]"), lvar_width)).collect();

        let input_vars: Vec<BV<'ctx>> = in_widths
            .iter()
            .enumerate()
            .map(|(i, &w)| {
                let v = ts.borrow_mut().make_inputvar(&format!("input_var[{i}]"), Width::Bv(w));
                v.as_bv().expect("circuit input must be a bit-vector")
            })
            .collect();

        let op_input_vars: Vec<Vec<BV<'ctx>>> = ops
            .iter()
            .enumerate()
            .map(|(i, op)| {
                op.types()
                    .inputs
                    .iter()
                    .enumerate()
                    .map(|(j, &w)| {
                        let v = ts.borrow_mut().make_inputvar(&format!("op_input_var[{i}][{j}]"), Width::Bv(w));
                        v.as_bv().expect("op input must be a bit-vector")
                    })
                    .collect()
            })
            .collect();

        let mut op_output_vars: Vec<Vec<BV<'ctx>>> = Vec::with_capacity(ops.len());
        for (i, op) in ops.iter().enumerate() {
            let outs = match op {
                Node::Spec(spec) => spec
                    .types
                    .outputs
                    .iter()
                    .enumerate()
                    .map(|(j, &w)| {
                        let v = ts.borrow_mut().make_inputvar(&format!("op_output_var[{i}][{j}]"), Width::Bv(w));
                        v.as_bv().expect("spec output must be a bit-vector")
                    })
                    .collect(),
                Node::Comb(comb) => comb.eval(&op_input_vars[i])?,
                Node::Seq(seq) => seq.eval(&op_input_vars[i], &ts, solver)?,
            };
            op_output_vars.push(outs);
        }

        let input_delays: Vec<BV<'ctx>> = match input_delays {
            Some(ds) => ds.into_iter().map(|d| solver.bv_lit(d as u64, delay_width)).collect(),
            None => (0..num_inputs).map(|_| solver.bv_lit(0, delay_width)).collect(),
        };

        let op_input_delays: Vec<Vec<BV<'ctx>>> = ops
            .iter()
            .enumerate()
            .map(|(i, op)| {
                (0..op.types().inputs.len())
                    .map(|j| solver.bv_const(&format!("op_input_delay[{i}][{j}]"), delay_width))
                    .collect()
            })
            .collect();

        let mut op_output_delays: Vec<Vec<BV<'ctx>>> = Vec::with_capacity(ops.len());
        for (i, op) in ops.iter().enumerate() {
            let delays = match op {
                Node::Comb(comb) => comb.timing(&op_input_delays[i])?,
                Node::Seq(seq) => seq.timing(&op_input_delays[i])?,
                Node::Spec(spec) => spec.timing(&op_input_delays[i])?,
            };
            op_output_delays.push(delays);
        }

        let mut enc = CircuitEncoding {
            solver,
            ops,
            in_widths,
            out_widths,
            num_inputs,
            num_outputs,
            num_op_outputs,
            num_lines,
            lvar_width,
            delay_width,
            input_lvars,
            op_input_lvars,
            op_output_lvars,
            output_lvars,
            input_vars,
            op_input_vars,
            op_output_vars,
            output_vars: Vec::new(),
            input_delays,
            op_input_delays,
            op_output_delays,
            output_delays: Vec::new(),
            setups: Vec::new(),
            holds: Vec::new(),
        };

        enc.output_vars = enc
            .output_lvars
            .clone()
            .iter()
            .zip(enc.out_widths.clone().iter())
            .map(|(lvar, &w)| enc.select_var(lvar, w))
            .collect::<Result<Vec<_>>>()?;

        enc.output_delays = enc
            .output_lvars
            .clone()
            .iter()
            .zip(enc.out_widths.clone().iter())
            .map(|(lvar, &w)| enc.select_delay(lvar, w))
            .collect::<Result<Vec<_>>>()?;

        enc.setups = enc
            .ops
            .iter()
            .flat_map(|op| match op {
                Node::Seq(seq) => seq.setup.borrow().clone(),
                Node::Spec(spec) => spec.setup.borrow().clone(),
                Node::Comb(_) => Vec::new(),
            })
            .collect();
        enc.holds = enc
            .ops
            .iter()
            .flat_map(|op| match op {
                Node::Seq(seq) => seq.hold.borrow().clone(),
                Node::Spec(spec) => spec.hold.borrow().clone(),
                Node::Comb(_) => Vec::new(),
            })
            .collect();

        Ok(enc)
    }

    pub fn ops(&self) -> &[Node<'ctx>] {
        &self.ops
    }

    fn select_generic(&self, pairs: &[(BV<'ctx>, BV<'ctx>)], target_lvar: &BV<'ctx>) -> Result<BV<'ctx>> {
        let mut iter = pairs.iter();
        let (_, first_val) = iter.next().ok_or_else(|| {
            SynthError::Type("no source of the required width exists for a sink in the interconnect".to_string())
        })?;
        let mut res = first_val.clone();
        for (lvar, val) in iter {
            let cond = self.solver.eq_bv(lvar, target_lvar);
            res = cond.ite(val, &res);
        }
        Ok(res)
    }

    /// Builds the multiplexer selecting, among every source of width
    /// `target_width`, the value whose lvar equals `target_lvar`.
    pub fn select_var(&self, target_lvar: &BV<'ctx>, target_width: u32) -> Result<BV<'ctx>> {
        let mut pairs: Vec<(BV<'ctx>, BV<'ctx>)> = Vec::new();
        for (lvar, var, &w) in itertools::izip!(&self.input_lvars, &self.input_vars, &self.in_widths) {
            if w == target_width {
                pairs.push((lvar.clone(), var.clone()));
            }
        }
        for (i, op) in self.ops.iter().enumerate() {
            for (lvar, var, &w) in itertools::izip!(&self.op_output_lvars[i], &self.op_output_vars[i], &op.types().outputs) {
                if w == target_width {
                    pairs.push((lvar.clone(), var.clone()));
                }
            }
        }
        self.select_generic(&pairs, target_lvar)
    }

    pub fn select_delay(&self, target_lvar: &BV<'ctx>, target_width: u32) -> Result<BV<'ctx>> {
        let mut pairs: Vec<(BV<'ctx>, BV<'ctx>)> = Vec::new();
        for (lvar, delay, &w) in itertools::izip!(&self.input_lvars, &self.input_delays, &self.in_widths) {
            if w == target_width {
                pairs.push((lvar.clone(), delay.clone()));
            }
        }
        for (i, op) in self.ops.iter().enumerate() {
            for (lvar, delay, &w) in itertools::izip!(&self.op_output_lvars[i], &self.op_output_delays[i], &op.types().outputs) {
                if w == target_width {
                    pairs.push((lvar.clone(), delay.clone()));
                }
            }
        }
        self.select_generic(&pairs, target_lvar)
    }

    pub fn p_acyc(&self) -> Bool<'ctx> {
        let mut cond = Vec::new();
        let lvar_width = self.lvar_width;
        let mut hardcoded_lvars = self.num_inputs as u64;
        for (i, op) in self.ops.iter().enumerate() {
            match op {
                Node::Comb(_) => {
                    for input_lvar in &self.op_input_lvars[i] {
                        cond.push(input_lvar.bvult(&self.op_output_lvars[i][0]));
                    }
                }
                Node::Seq(_) => {
                    let lit = self.solver.bv_lit(hardcoded_lvars, lvar_width);
                    cond.push(self.solver.eq_bv(&self.op_output_lvars[i][0], &lit));
                    hardcoded_lvars += self.op_output_lvars[i].len() as u64;
                }
                Node::Spec(spec) => {
                    for (output_lvar, &moore) in self.op_output_lvars[i].iter().zip(spec.is_moores.iter()) {
                        if moore {
                            let lit = self.solver.bv_lit(hardcoded_lvars, lvar_width);
                            cond.push(self.solver.eq_bv(output_lvar, &lit));
                            hardcoded_lvars += 1;
                        } else {
                            for input_lvar in &self.op_input_lvars[i] {
                                cond.push(input_lvar.bvult(output_lvar));
                            }
                        }
                    }
                }
            }
        }
        self.solver.and_all(&cond)
    }

    pub fn p_lvars_in_range(&self) -> Bool<'ctx> {
        let min_lvar = self.solver.bv_lit(self.num_inputs as u64, self.lvar_width);
        let max_lvar = self.solver.bv_lit((self.num_lines - 1) as u64, self.lvar_width);
        let mut cond = Vec::new();
        for out_lvars in &self.op_output_lvars {
            for lvar in out_lvars {
                cond.push(lvar.bvuge(&min_lvar));
                cond.push(lvar.bvule(&max_lvar));
            }
        }
        self.solver.and_all(&cond)
    }

    pub fn p_multi_out(&self) -> Bool<'ctx> {
        let one = self.solver.bv_lit(1, self.lvar_width);
        let mut cond = Vec::new();
        for (output_lvars, op) in self.op_output_lvars.iter().zip(self.ops.iter()) {
            if matches!(op, Node::Spec(_)) {
                continue;
            }
            for (l, r) in output_lvars.iter().zip(output_lvars.iter().skip(1)) {
                cond.push(self.solver.eq_bv(&l.bvadd(&one), r));
            }
        }
        self.solver.and_all(&cond)
    }

    pub fn p_src_lvars_unique(&self) -> Bool<'ctx> {
        let lvars_all: Vec<&BV<'ctx>> = self.op_output_lvars.iter().flatten().collect();
        let mut cond = Vec::new();
        for i in 0..lvars_all.len() {
            for j in (i + 1)..lvars_all.len() {
                cond.push(self.solver.eq_bv(lvars_all[i], lvars_all[j]).not());
            }
        }
        self.solver.and_all(&cond)
    }

    pub fn p_well_typed(&self) -> Bool<'ctx> {
        let mut srcs: HashMap<u32, Vec<BV<'ctx>>> = HashMap::new();
        for (lvar, &w) in self.input_lvars.iter().zip(self.in_widths.iter()) {
            srcs.entry(w).or_default().push(lvar.clone());
        }
        for (output_lvars, op) in self.op_output_lvars.iter().zip(self.ops.iter()) {
            for (lvar, &w) in output_lvars.iter().zip(op.types().outputs.iter()) {
                srcs.entry(w).or_default().push(lvar.clone());
            }
        }

        let mut cond = Vec::new();
        for (lvar, &w) in self.output_lvars.iter().zip(self.out_widths.iter()) {
            let disjuncts: Vec<Bool<'ctx>> = srcs.get(&w).map(|v| v.iter().map(|s| self.solver.eq_bv(lvar, s)).collect()).unwrap_or_default();
            cond.push(self.solver.or_all(&disjuncts));
        }
        for (input_lvars, op) in self.op_input_lvars.iter().zip(self.ops.iter()) {
            for (lvar, &w) in input_lvars.iter().zip(op.types().inputs.iter()) {
                let disjuncts: Vec<Bool<'ctx>> = srcs.get(&w).map(|v| v.iter().map(|s| self.solver.eq_bv(lvar, s)).collect()).unwrap_or_default();
                cond.push(self.solver.or_all(&disjuncts));
            }
        }
        self.solver.and_all(&cond)
    }

    pub fn p_wfp(&self) -> Bool<'ctx> {
        self.solver.and_all(&[
            self.p_acyc(),
            self.p_lvars_in_range(),
            self.p_multi_out(),
            self.p_src_lvars_unique(),
            self.p_well_typed(),
        ])
    }

    pub fn p_conn_vars(&self) -> Result<Bool<'ctx>> {
        let mut cond = Vec::new();
        for (i, op) in self.ops.iter().enumerate() {
            for (lvar, var, &w) in itertools::izip!(&self.op_input_lvars[i], &self.op_input_vars[i], &op.types().inputs) {
                let selected = self.select_var(lvar, w)?;
                cond.push(self.solver.eq_bv(&selected, var));
            }
        }
        Ok(self.solver.and_all(&cond))
    }

    pub fn p_conn_delays(&self) -> Result<Bool<'ctx>> {
        let mut cond = Vec::new();
        for (i, op) in self.ops.iter().enumerate() {
            for (lvar, delay, &w) in itertools::izip!(&self.op_input_lvars[i], &self.op_input_delays[i], &op.types().inputs) {
                let selected = self.select_delay(lvar, w)?;
                cond.push(self.solver.eq_bv(&selected, delay));
            }
        }
        Ok(self.solver.and_all(&cond))
    }

    /// The E/A/D variable partition, assembled fresh from the lvars, circuit
    /// inputs, and dependent port/state/spec-output variables this encoding
    /// owns.
    pub fn partition(&self) -> VariablePartition<'ctx> {
        let mut e: Vec<BV<'ctx>> = self.op_input_lvars.iter().flatten().cloned().collect();
        e.extend(self.op_output_lvars.iter().flatten().cloned());
        e.extend(self.output_lvars.iter().cloned());

        let a: Vec<BV<'ctx>> = self.input_vars.clone();

        let mut d: Vec<BV<'ctx>> = self.op_input_vars.iter().flatten().cloned().collect();
        for op in &self.ops {
            if let Node::Seq(seq) = op {
                d.extend(seq.state_vars.borrow().iter().cloned());
            }
        }
        for (i, op) in self.ops.iter().enumerate() {
            if matches!(op, Node::Spec(_)) {
                d.extend(self.op_output_vars[i].iter().cloned());
            }
        }

        VariablePartition { e, a, d }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::nodes::{NodeLibrary, NodeTypes, ParamSchema, Params, SeqTiming};
    use crate::unroller::TransitionSystem;

    /// A `SpecNode` with one Moore output and one Mealy output exercises the
    /// one case `p_acyc` treats differently within a single op: the Moore
    /// output must land on the next hardcoded lvar slot, while the Mealy
    /// output is merely ordered after its own inputs, same as a combinational
    /// output.
    #[test]
    fn mixed_moore_mealy_spec_outputs_get_distinct_acyclicity_treatment() {
        let cfg = crate::solver::default_config();
        let ctx = z3::Context::new(&cfg);
        let solver = SolverCtx::new(&ctx);
        let ts = Rc::new(RefCell::new(TransitionSystem::new(&solver)));

        const SCHEMA: ParamSchema = ParamSchema(&[]);
        let params: Params = Params::new();
        let types = NodeTypes { inputs: vec![4], outputs: vec![1, 1] };

        let eval_fn: crate::nodes::SpecEvalFn = Rc::new(|_params, history: &[Vec<BV>], solver: &SolverCtx| {
            let last = history.last().map(|cycle| cycle[0].clone()).unwrap_or_else(|| solver.bv_lit(0, 4));
            vec![solver.bv_lit(0, 1), last.extract(0, 0)]
        });
        let timing_fn: crate::nodes::SpecTimingFn = Rc::new(|_params, delays: &[BV]| SeqTiming {
            setup: vec![delays[0].clone()],
            hold: vec![delays[0].clone()],
            output_delay: vec![delays[0].clone()],
        });

        let lib = NodeLibrary::new(&solver, ts.clone(), 8);
        let spec_node = lib
            .make_spec("MixedSpec", &SCHEMA, params, types, eval_fn, timing_fn, vec![true, false])
            .expect("a two-output spec node with one tag per output is well-formed");

        let encoding = CircuitEncoding::new(&solver, ts, 8, vec![4], vec![1], vec![spec_node], None)
            .expect("a single spec op against matching circuit widths should build");

        let moore_lvar = &encoding.op_output_lvars[0][0];
        let hardcoded_slot = solver.bv_lit(encoding.num_inputs as u64, encoding.lvar_width);
        solver.push();
        solver.assert_formula(&encoding.p_acyc());
        solver.assert_formula(&solver.eq_bv(moore_lvar, &hardcoded_slot).not());
        assert!(!solver.check_sat().unwrap(), "p_acyc must pin the Moore output's lvar to its hardcoded slot");
        solver.pop(1);

        let mealy_lvar = &encoding.op_output_lvars[0][1];
        solver.push();
        solver.assert_formula(&encoding.p_acyc());
        solver.assert_formula(&mealy_lvar.bvult(&encoding.input_lvars[0]));
        assert!(!solver.check_sat().unwrap(), "p_acyc must keep the Mealy output's lvar above its own inputs");
        solver.pop(1);
    }
}
