//! Parameterized factory for the three node flavors: combinational, sequential,
//! and black-box behavioral ("spec") nodes.
//!
//! Construction here is data-driven rather than the dynamic-class-per-node
//! style of the system this crate reimplements: a node descriptor is a plain
//! struct holding a name, its computed [`NodeTypes`], and a handful of
//! `Rc<dyn Fn>` closures for evaluation and timing. [`NodeLibrary`] owns the
//! shared transition system handle and the register-naming counter; nothing
//! here keeps process-wide or per-"class" state.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use z3::ast::{Ast, Dynamic, BV};

use crate::error::{Result, SynthError};
use crate::solver::{SolverCtx, Width};
use crate::unroller::TransitionSystem;

/// A constructor parameter value. Node parameters are small (bit widths,
/// constant delays, an init value, or — for `SequenceDetector`-style spec
/// nodes — a literal sequence of symbols), so a two-variant enum covers every
/// catalog entry and every spec node this crate's examples define.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Int(i64),
    IntTuple(Vec<i64>),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[i64]> {
        match self {
            ParamValue::IntTuple(v) => Some(v),
            _ => None,
        }
    }
}

pub type Params = HashMap<String, ParamValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    IntTuple,
}

/// The declared name/kind pairs a node constructor requires. Missing keys,
/// extra keys, and keys of the wrong kind are all configuration errors,
/// reported before any term is built.
pub struct ParamSchema(pub &'static [(&'static str, ParamKind)]);

impl ParamSchema {
    fn validate(&self, node_name: &str, params: &Params) -> Result<()> {
        for (key, _) in self.0 {
            if !params.contains_key(*key) {
                return Err(SynthError::Config(format!(
                    "{node_name} expects parameter {key}"
                )));
            }
        }
        for (key, value) in params {
            let Some((_, kind)) = self.0.iter().find(|(k, _)| k == key) else {
                return Err(SynthError::Config(format!(
                    "{node_name} does not expect parameter {key}"
                )));
            };
            let ok = matches!(
                (kind, value),
                (ParamKind::Int, ParamValue::Int(_)) | (ParamKind::IntTuple, ParamValue::IntTuple(_))
            );
            if !ok {
                return Err(SynthError::Config(format!(
                    "{node_name} parameter {key} has the wrong kind"
                )));
            }
        }
        Ok(())
    }
}

fn int_param(params: &Params, key: &str) -> i64 {
    params
        .get(key)
        .and_then(ParamValue::as_int)
        .unwrap_or_else(|| panic!("parameter {key} missing or wrong kind after schema validation"))
}

/// Bit widths of a node's input and output ports. All ports are bit-vectors;
/// a one-bit width stands in for what would be a boolean port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTypes {
    pub inputs: Vec<u32>,
    pub outputs: Vec<u32>,
}

fn check_widths(node_name: &str, label: &str, expected: &[u32], actual: &[u32]) -> Result<()> {
    if expected != actual {
        return Err(SynthError::Type(format!(
            "{node_name} expects {label} of widths {expected:?}, got {actual:?}"
        )));
    }
    Ok(())
}

fn widths_of(terms: &[BV]) -> Vec<u32> {
    terms.iter().map(|t| t.get_size()).collect()
}

/// Setup/hold/output-delay terms a stateful or spec node publishes per output,
/// mirroring the timing tuple the synthesis encoder layers into `synth_base`.
pub struct SeqTiming<'ctx> {
    pub setup: Vec<BV<'ctx>>,
    pub hold: Vec<BV<'ctx>>,
    pub output_delay: Vec<BV<'ctx>>,
}

type CombEvalFn<'ctx> = Rc<dyn Fn(&[BV<'ctx>]) -> Vec<BV<'ctx>>>;
type CombTimingFn<'ctx> = Rc<dyn Fn(&[BV<'ctx>]) -> Vec<BV<'ctx>>>;

pub struct CombNode<'ctx> {
    pub name: String,
    pub types: NodeTypes,
    eval_fn: CombEvalFn<'ctx>,
    timing_fn: CombTimingFn<'ctx>,
}

impl<'ctx> CombNode<'ctx> {
    pub fn eval(&self, inputs: &[BV<'ctx>]) -> Result<Vec<BV<'ctx>>> {
        check_widths(&self.name, "input values", &self.types.inputs, &widths_of(inputs))?;
        let out = (self.eval_fn)(inputs);
        check_widths(&self.name, "output values", &self.types.outputs, &widths_of(&out))?;
        Ok(out)
    }

    pub fn timing(&self, input_delays: &[BV<'ctx>]) -> Result<Vec<BV<'ctx>>> {
        if input_delays.len() != self.types.inputs.len() {
            return Err(SynthError::Type(format!(
                "{} expects {} input delay terms, got {}",
                self.name,
                self.types.inputs.len(),
                input_delays.len()
            )));
        }
        let out = (self.timing_fn)(input_delays);
        if out.len() != self.types.outputs.len() {
            return Err(SynthError::Type(format!(
                "{} timing function produced {} delays, expected {}",
                self.name,
                out.len(),
                self.types.outputs.len()
            )));
        }
        Ok(out)
    }
}

type SeqEvalFn<'ctx> =
    Rc<dyn Fn(&Params, &str, &[BV<'ctx>], &RefCell<TransitionSystem<'ctx>>, &SolverCtx<'ctx>) -> Vec<BV<'ctx>>>;
type SeqTimingFn<'ctx> = Rc<dyn Fn(&Params, &[BV<'ctx>]) -> SeqTiming<'ctx>>;

pub struct SeqNode<'ctx> {
    pub name: String,
    pub types: NodeTypes,
    pub state_name: String,
    params: Params,
    eval_fn: SeqEvalFn<'ctx>,
    timing_fn: SeqTimingFn<'ctx>,
    /// Populated by [`Self::eval`]: the node's fixed state-variable terms.
    pub state_vars: RefCell<Vec<BV<'ctx>>>,
    pub setup: RefCell<Vec<BV<'ctx>>>,
    pub hold: RefCell<Vec<BV<'ctx>>>,
}

impl<'ctx> SeqNode<'ctx> {
    pub fn eval(
        &self,
        inputs: &[BV<'ctx>],
        ts: &RefCell<TransitionSystem<'ctx>>,
        solver: &SolverCtx<'ctx>,
    ) -> Result<Vec<BV<'ctx>>> {
        check_widths(&self.name, "input values", &self.types.inputs, &widths_of(inputs))?;
        let out = (self.eval_fn)(&self.params, &self.state_name, inputs, ts, solver);
        check_widths(&self.name, "output values", &self.types.outputs, &widths_of(&out))?;
        *self.state_vars.borrow_mut() = out.clone();
        Ok(out)
    }

    pub fn timing(&self, input_delays: &[BV<'ctx>]) -> Result<Vec<BV<'ctx>>> {
        if input_delays.len() != self.types.inputs.len() {
            return Err(SynthError::Type(format!(
                "{} expects {} input delay terms, got {}",
                self.name,
                self.types.inputs.len(),
                input_delays.len()
            )));
        }
        let timing = (self.timing_fn)(&self.params, input_delays);
        if timing.setup.len() != self.types.outputs.len()
            || timing.hold.len() != self.types.outputs.len()
            || timing.output_delay.len() != self.types.outputs.len()
        {
            return Err(SynthError::Type(format!(
                "{} timing function produced mismatched setup/hold/output-delay arities",
                self.name
            )));
        }
        *self.setup.borrow_mut() = timing.setup;
        *self.hold.borrow_mut() = timing.hold;
        Ok(timing.output_delay)
    }
}

pub(crate) type SpecEvalFn<'ctx> = Rc<dyn Fn(&Params, &[Vec<BV<'ctx>>], &SolverCtx<'ctx>) -> Vec<BV<'ctx>>>;
pub(crate) type SpecTimingFn<'ctx> = Rc<dyn Fn(&Params, &[BV<'ctx>]) -> SeqTiming<'ctx>>;

pub struct SpecNode<'ctx> {
    pub name: String,
    pub types: NodeTypes,
    pub is_moores: Vec<bool>,
    params: Params,
    eval_fn: SpecEvalFn<'ctx>,
    timing_fn: SpecTimingFn<'ctx>,
    pub setup: RefCell<Vec<BV<'ctx>>>,
    pub hold: RefCell<Vec<BV<'ctx>>>,
}

impl<'ctx> SpecNode<'ctx> {
    /// `history` holds one input tuple per cycle from 0 through the current
    /// cycle, inclusive — exactly what the behavioral `eval_fn` needs to
    /// produce this cycle's outputs.
    pub fn eval(&self, history: &[Vec<BV<'ctx>>], solver: &SolverCtx<'ctx>) -> Result<Vec<BV<'ctx>>> {
        for inputs_at_cycle in history {
            check_widths(&self.name, "input values at a cycle", &self.types.inputs, &widths_of(inputs_at_cycle))?;
        }
        let out = (self.eval_fn)(&self.params, history, solver);
        check_widths(&self.name, "output values", &self.types.outputs, &widths_of(&out))?;
        Ok(out)
    }

    pub fn timing(&self, input_delays: &[BV<'ctx>]) -> Result<Vec<BV<'ctx>>> {
        if input_delays.len() != self.types.inputs.len() {
            return Err(SynthError::Type(format!(
                "{} expects {} input delay terms, got {}",
                self.name,
                self.types.inputs.len(),
                input_delays.len()
            )));
        }
        let timing = (self.timing_fn)(&self.params, input_delays);
        if timing.setup.len() != self.types.outputs.len()
            || timing.hold.len() != self.types.outputs.len()
            || timing.output_delay.len() != self.types.outputs.len()
        {
            return Err(SynthError::Type(format!(
                "{} timing function produced mismatched setup/hold/output-delay arities",
                self.name
            )));
        }
        *self.setup.borrow_mut() = timing.setup;
        *self.hold.borrow_mut() = timing.hold;
        Ok(timing.output_delay)
    }
}

/// Tagged union over the three node flavors. `Seq` and `Spec` carry the
/// extra fields (`state_vars`, `is_moores`) that only make sense for them.
pub enum Node<'ctx> {
    Comb(CombNode<'ctx>),
    Seq(SeqNode<'ctx>),
    Spec(SpecNode<'ctx>),
}

impl<'ctx> Node<'ctx> {
    pub fn name(&self) -> &str {
        match self {
            Node::Comb(n) => &n.name,
            Node::Seq(n) => &n.name,
            Node::Spec(n) => &n.name,
        }
    }

    pub fn types(&self) -> &NodeTypes {
        match self {
            Node::Comb(n) => &n.types,
            Node::Seq(n) => &n.types,
            Node::Spec(n) => &n.types,
        }
    }
}

/// Converts a boolean term to a 1-bit bit-vector (`1` for true, `0` for
/// false) — the convention this crate's catalog uses for boolean-sorted
/// ports, matching the distilled spec's "no width" comparison outputs.
pub(crate) fn bool_to_bv1<'ctx>(solver: &SolverCtx<'ctx>, b: &z3::ast::Bool<'ctx>) -> BV<'ctx> {
    let one = solver.bv_lit(1, 1);
    let zero = solver.bv_lit(0, 1);
    b.ite(&one, &zero)
}

fn bv1_to_bool<'ctx>(solver: &SolverCtx<'ctx>, s: &BV<'ctx>) -> z3::ast::Bool<'ctx> {
    s._eq(&solver.bv_lit(1, 1))
}

fn max_delay<'ctx>(a: &BV<'ctx>, b: &BV<'ctx>) -> BV<'ctx> {
    a.bvsgt(b).ite(a, b)
}

/// Owns the transition-system handle and the register-naming counter; the
/// sole factory for node instances. Constructed once per synthesis session.
pub struct NodeLibrary<'ctx> {
    solver: &'ctx SolverCtx<'ctx>,
    ts: Rc<RefCell<TransitionSystem<'ctx>>>,
    delay_width: u32,
    register_counter: Cell<u64>,
}

const BIN_SCHEMA: ParamSchema = ParamSchema(&[("N", ParamKind::Int), ("delay", ParamKind::Int)]);
const MUX_SCHEMA: ParamSchema = ParamSchema(&[("N", ParamKind::Int), ("delay", ParamKind::Int)]);
const REGISTER_SCHEMA: ParamSchema = ParamSchema(&[
    ("N", ParamKind::Int),
    ("init", ParamKind::Int),
    ("setup", ParamKind::Int),
    ("hold", ParamKind::Int),
    ("output_delay", ParamKind::Int),
]);

impl<'ctx> NodeLibrary<'ctx> {
    pub fn new(solver: &'ctx SolverCtx<'ctx>, ts: Rc<RefCell<TransitionSystem<'ctx>>>, delay_width: u32) -> Self {
        NodeLibrary {
            solver,
            ts,
            delay_width,
            register_counter: Cell::new(0),
        }
    }

    pub fn delay_width(&self) -> u32 {
        self.delay_width
    }

    pub fn transition_system(&self) -> Rc<RefCell<TransitionSystem<'ctx>>> {
        self.ts.clone()
    }

    fn bin_delay_fn(&self, op_delay: i64) -> CombTimingFn<'ctx> {
        let delay_width = self.delay_width;
        let solver = self.solver;
        Rc::new(move |delays: &[BV<'ctx>]| {
            let combined = max_delay(&delays[0], &delays[1]);
            let op_delay = combined.bvadd(&solver.bv_lit(op_delay as u64, delay_width));
            vec![op_delay]
        })
    }

    fn make_comb(
        &self,
        name: &str,
        schema: &ParamSchema,
        params: Params,
        types: NodeTypes,
        eval_fn: CombEvalFn<'ctx>,
        timing_fn: CombTimingFn<'ctx>,
    ) -> Result<Node<'ctx>> {
        schema.validate(name, &params)?;
        Ok(Node::Comb(CombNode {
            name: name.to_string(),
            types,
            eval_fn,
            timing_fn,
        }))
    }

    fn binary_comb(&self, name: &'static str, params: Params, out_width: Option<u32>, eval: fn(&BV<'ctx>, &BV<'ctx>) -> BV<'ctx>) -> Result<Node<'ctx>> {
        BIN_SCHEMA.validate(name, &params)?;
        let n = int_param(&params, "N") as u32;
        let delay = int_param(&params, "delay");
        let types = NodeTypes {
            inputs: vec![n, n],
            outputs: vec![out_width.unwrap_or(n)],
        };
        let eval_fn: CombEvalFn<'ctx> = Rc::new(move |inputs: &[BV<'ctx>]| vec![eval(&inputs[0], &inputs[1])]);
        let timing_fn = self.bin_delay_fn(delay);
        self.make_comb(name, &BIN_SCHEMA, params, types, eval_fn, timing_fn)
    }

    pub fn add(&self, params: Params) -> Result<Node<'ctx>> {
        self.binary_comb("Add", params, None, |x, y| x.bvadd(y))
    }

    pub fn sub(&self, params: Params) -> Result<Node<'ctx>> {
        self.binary_comb("Sub", params, None, |x, y| x.bvsub(y))
    }

    pub fn mul(&self, params: Params) -> Result<Node<'ctx>> {
        self.binary_comb("Mul", params, None, |x, y| x.bvmul(y))
    }

    pub fn and(&self, params: Params) -> Result<Node<'ctx>> {
        self.binary_comb("And", params, None, |x, y| x.bvand(y))
    }

    pub fn or(&self, params: Params) -> Result<Node<'ctx>> {
        self.binary_comb("Or", params, None, |x, y| x.bvor(y))
    }

    pub fn xor(&self, params: Params) -> Result<Node<'ctx>> {
        self.binary_comb("Xor", params, None, |x, y| x.bvxor(y))
    }

    fn cmp_comb(&self, name: &'static str, params: Params, eval: fn(&SolverCtx<'ctx>, &BV<'ctx>, &BV<'ctx>) -> BV<'ctx>) -> Result<Node<'ctx>> {
        BIN_SCHEMA.validate(name, &params)?;
        let n = int_param(&params, "N") as u32;
        let delay = int_param(&params, "delay");
        let solver = self.solver;
        let types = NodeTypes {
            inputs: vec![n, n],
            outputs: vec![1],
        };
        let eval_fn: CombEvalFn<'ctx> = Rc::new(move |inputs: &[BV<'ctx>]| vec![eval(solver, &inputs[0], &inputs[1])]);
        let timing_fn = self.bin_delay_fn(delay);
        self.make_comb(name, &BIN_SCHEMA, params, types, eval_fn, timing_fn)
    }

    pub fn equal(&self, params: Params) -> Result<Node<'ctx>> {
        self.cmp_comb("Equal", params, |s, x, y| bool_to_bv1(s, &x._eq(y)))
    }

    pub fn ult(&self, params: Params) -> Result<Node<'ctx>> {
        self.cmp_comb("Ult", params, |s, x, y| bool_to_bv1(s, &x.bvult(y)))
    }

    pub fn ugt(&self, params: Params) -> Result<Node<'ctx>> {
        self.cmp_comb("Ugt", params, |s, x, y| bool_to_bv1(s, &x.bvugt(y)))
    }

    pub fn ule(&self, params: Params) -> Result<Node<'ctx>> {
        self.cmp_comb("Ule", params, |s, x, y| bool_to_bv1(s, &x.bvule(y)))
    }

    pub fn uge(&self, params: Params) -> Result<Node<'ctx>> {
        self.cmp_comb("Uge", params, |s, x, y| bool_to_bv1(s, &x.bvuge(y)))
    }

    pub fn mux(&self, params: Params) -> Result<Node<'ctx>> {
        MUX_SCHEMA.validate("Mux", &params)?;
        let n = int_param(&params, "N") as u32;
        let delay = int_param(&params, "delay");
        let delay_width = self.delay_width;
        let solver = self.solver;
        let types = NodeTypes {
            inputs: vec![1, n, n],
            outputs: vec![n],
        };
        let eval_fn: CombEvalFn<'ctx> = Rc::new(move |inputs: &[BV<'ctx>]| {
            let sel = bv1_to_bool(solver, &inputs[0]);
            vec![sel.ite(&inputs[1], &inputs[2])]
        });
        let timing_fn: CombTimingFn<'ctx> = Rc::new(move |delays: &[BV<'ctx>]| {
            let m = max_delay(&max_delay(&delays[0], &delays[1]), &delays[2]);
            vec![m.bvadd(&solver.bv_lit(delay as u64, delay_width))]
        });
        self.make_comb("Mux", &MUX_SCHEMA, params, types, eval_fn, timing_fn)
    }

    /// Registers a new `Register(N, init, setup, hold, output_delay)`
    /// instance. Its state-variable name is assigned from the library's
    /// counter so every instance is unique without any per-type global state.
    pub fn register(&self, params: Params) -> Result<Node<'ctx>> {
        REGISTER_SCHEMA.validate("Register", &params)?;
        let n = int_param(&params, "N") as u32;
        let count = self.register_counter.get();
        self.register_counter.set(count + 1);
        let state_name = format!("Register{count}");

        let types = NodeTypes {
            inputs: vec![n],
            outputs: vec![n],
        };

        let eval_fn: SeqEvalFn<'ctx> = Rc::new(
            |params: &Params, state_name: &str, inputs: &[BV<'ctx>], ts: &RefCell<TransitionSystem<'ctx>>, solver: &SolverCtx<'ctx>| {
                let n = int_param(params, "N") as u32;
                let reg_dyn = ts.borrow_mut().make_statevar(state_name, Width::Bv(n));
                let reg = reg_dyn.as_bv().expect("register state variable must be a bit-vector");
                let init = int_param(params, "init");
                let init_lit = solver.bv_lit(init as u64, n);
                ts.borrow_mut().constrain_init(solver.eq_bv(&reg, &init_lit));
                ts.borrow_mut().assign_next(&reg_dyn, Dynamic::from_ast(&inputs[0]));
                vec![reg]
            },
        );

        let delay_width = self.delay_width;
        let solver = self.solver;
        let timing_fn: SeqTimingFn<'ctx> = Rc::new(move |params: &Params, delays: &[BV<'ctx>]| {
            let setup_param = int_param(params, "setup");
            let hold_param = int_param(params, "hold");
            let output_delay_param = int_param(params, "output_delay");
            let delay = &delays[0];
            let setup = delay.bvadd(&solver.bv_lit(setup_param as u64, delay_width));
            let hold = delay.bvsub(&solver.bv_lit(hold_param as u64, delay_width));
            let output_delay = solver.bv_lit(output_delay_param as u64, delay_width);
            SeqTiming {
                setup: vec![setup],
                hold: vec![hold],
                output_delay: vec![output_delay],
            }
        });

        Ok(Node::Seq(SeqNode {
            name: "Register".to_string(),
            types,
            state_name,
            params,
            eval_fn,
            timing_fn,
            state_vars: RefCell::new(Vec::new()),
            setup: RefCell::new(Vec::new()),
            hold: RefCell::new(Vec::new()),
        }))
    }

    /// Publishes a user-defined black-box behavioral node. `eval_fn` receives
    /// the per-cycle input history; `timing_fn` receives this cycle's input
    /// delays and must return setup/hold/output-delay terms per output;
    /// `is_moores[i]` tags output `i` as Moore (fixed lvar slot) or Mealy
    /// (floats like a combinational output).
    pub fn make_spec(
        &self,
        name: &str,
        schema: &ParamSchema,
        params: Params,
        types: NodeTypes,
        eval_fn: SpecEvalFn<'ctx>,
        timing_fn: SpecTimingFn<'ctx>,
        is_moores: Vec<bool>,
    ) -> Result<Node<'ctx>> {
        schema.validate(name, &params)?;
        if is_moores.len() != types.outputs.len() {
            return Err(SynthError::Config(format!(
                "{name} declares {} outputs but {} is_moores tags",
                types.outputs.len(),
                is_moores.len()
            )));
        }
        Ok(Node::Spec(SpecNode {
            name: name.to_string(),
            types,
            is_moores,
            params,
            eval_fn,
            timing_fn,
            setup: RefCell::new(Vec::new()),
            hold: RefCell::new(Vec::new()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unroller::TransitionSystem;

    fn params(entries: &[(&str, i64)]) -> Params {
        entries.iter().map(|(k, v)| (k.to_string(), ParamValue::Int(*v))).collect()
    }

    /// Asserts that `lhs` and `rhs` are forced equal by every other assertion
    /// currently on the solver stack, the same "assert the negation is UNSAT"
    /// idiom `encoding`'s own test module uses.
    fn assert_bv_eq<'ctx>(solver: &SolverCtx<'ctx>, lhs: &BV<'ctx>, rhs: &BV<'ctx>, msg: &str) {
        solver.push();
        solver.assert_formula(&solver.eq_bv(lhs, rhs).not());
        assert!(!solver.check_sat().unwrap(), "{msg}");
        solver.pop(1);
    }

    #[test]
    fn add_eval_computes_bvadd_of_its_two_inputs() {
        let cfg = crate::solver::default_config();
        let ctx = z3::Context::new(&cfg);
        let solver = SolverCtx::new(&ctx);
        let ts = Rc::new(RefCell::new(TransitionSystem::new(&solver)));
        let lib = NodeLibrary::new(&solver, ts, 8);

        let Node::Comb(add) = lib.add(params(&[("N", 4), ("delay", 1)])).expect("Add should construct") else {
            panic!("Add must be a CombNode")
        };

        let a = solver.bv_lit(5, 4);
        let b = solver.bv_lit(9, 4);
        let out = add.eval(&[a, b]).expect("eval should type-check two 4-bit inputs");
        assert_eq!(out.len(), 1);
        let expected = solver.bv_lit(14, 4); // (5 + 9) mod 16
        assert_bv_eq(&solver, &out[0], &expected, "Add.eval must compute bvadd of its two inputs");
    }

    #[test]
    fn add_eval_rejects_mismatched_input_width() {
        let cfg = crate::solver::default_config();
        let ctx = z3::Context::new(&cfg);
        let solver = SolverCtx::new(&ctx);
        let ts = Rc::new(RefCell::new(TransitionSystem::new(&solver)));
        let lib = NodeLibrary::new(&solver, ts, 8);

        let Node::Comb(add) = lib.add(params(&[("N", 4), ("delay", 1)])).expect("Add should construct") else {
            panic!("Add must be a CombNode")
        };

        let a = solver.bv_lit(5, 4);
        let b = solver.bv_lit(9, 8);
        let err = add.eval(&[a, b]).expect_err("a width-8 second input must be rejected against a width-4 schema");
        assert!(matches!(err, SynthError::Type(_)));
    }

    #[test]
    fn add_timing_is_max_of_input_delays_plus_op_delay() {
        let cfg = crate::solver::default_config();
        let ctx = z3::Context::new(&cfg);
        let solver = SolverCtx::new(&ctx);
        let ts = Rc::new(RefCell::new(TransitionSystem::new(&solver)));
        let lib = NodeLibrary::new(&solver, ts, 8);

        let Node::Comb(add) = lib.add(params(&[("N", 4), ("delay", 2)])).expect("Add should construct") else {
            panic!("Add must be a CombNode")
        };

        let d0 = solver.bv_lit(3, 8);
        let d1 = solver.bv_lit(7, 8);
        let out_delay = add.timing(&[d0, d1]).expect("timing should type-check two delay terms");
        assert_eq!(out_delay.len(), 1);
        let expected = solver.bv_lit(9, 8); // max(3, 7) + 2
        assert_bv_eq(&solver, &out_delay[0], &expected, "combinational output delay must be max(input delays) + params[\"delay\"]");
    }

    #[test]
    fn equal_eval_produces_a_one_bit_boolean_result() {
        let cfg = crate::solver::default_config();
        let ctx = z3::Context::new(&cfg);
        let solver = SolverCtx::new(&ctx);
        let ts = Rc::new(RefCell::new(TransitionSystem::new(&solver)));
        let lib = NodeLibrary::new(&solver, ts, 8);

        let Node::Comb(equal) = lib.equal(params(&[("N", 4), ("delay", 0)])).expect("Equal should construct") else {
            panic!("Equal must be a CombNode")
        };
        assert_eq!(equal.types.outputs, vec![1], "comparison nodes publish a 1-bit boolean-sorted output");

        let matching = equal.eval(&[solver.bv_lit(5, 4), solver.bv_lit(5, 4)]).expect("eval should type-check");
        assert_bv_eq(&solver, &matching[0], &solver.bv_lit(1, 1), "Equal on matching operands must produce the bv1 `true` encoding");

        let differing = equal.eval(&[solver.bv_lit(5, 4), solver.bv_lit(6, 4)]).expect("eval should type-check");
        assert_bv_eq(&solver, &differing[0], &solver.bv_lit(0, 1), "Equal on differing operands must produce the bv1 `false` encoding");
    }

    #[test]
    fn mux_eval_selects_the_first_input_when_selector_is_true() {
        let cfg = crate::solver::default_config();
        let ctx = z3::Context::new(&cfg);
        let solver = SolverCtx::new(&ctx);
        let ts = Rc::new(RefCell::new(TransitionSystem::new(&solver)));
        let lib = NodeLibrary::new(&solver, ts, 8);

        let Node::Comb(mux) = lib.mux(params(&[("N", 4), ("delay", 0)])).expect("Mux should construct") else {
            panic!("Mux must be a CombNode")
        };

        let sel_true = solver.bv_lit(1, 1);
        let on_true = solver.bv_lit(3, 4);
        let on_false = solver.bv_lit(12, 4);
        let out = mux.eval(&[sel_true, on_true, on_false]).expect("eval should type-check");
        assert_bv_eq(&solver, &out[0], &solver.bv_lit(3, 4), "selector = 1 must route the first data input through");

        let sel_false = solver.bv_lit(0, 1);
        let out = mux.eval(&[sel_false, solver.bv_lit(3, 4), solver.bv_lit(12, 4)]).expect("eval should type-check");
        assert_bv_eq(&solver, &out[0], &solver.bv_lit(12, 4), "selector = 0 must route the second data input through");
    }

    #[test]
    fn register_eval_pins_the_state_variable_to_init_at_reset() {
        let cfg = crate::solver::default_config();
        let ctx = z3::Context::new(&cfg);
        let solver = SolverCtx::new(&ctx);
        let ts = Rc::new(RefCell::new(TransitionSystem::new(&solver)));
        let lib = NodeLibrary::new(&solver, ts.clone(), 8);

        let Node::Seq(register) = lib
            .register(params(&[("N", 4), ("init", 5), ("setup", 0), ("hold", 0), ("output_delay", 0)]))
            .expect("Register should construct")
        else {
            panic!("Register must be a SeqNode")
        };

        let input = solver.bv_lit(0, 4);
        let out = register.eval(&[input], &ts, &solver).expect("eval should type-check a single width-4 input");
        assert_eq!(out.len(), 1);
        assert_eq!(register.state_vars.borrow().len(), 1, "eval must record the register's fixed state-variable term");

        solver.push();
        solver.assert_formula(&ts.borrow().init());
        let init_lit = solver.bv_lit(5, 4);
        let diverges = solver.eq_bv(&out[0], &init_lit).not();
        solver.assert_formula(&diverges);
        assert!(!solver.check_sat().unwrap(), "constrain_init must pin the register's state variable to params[\"init\"]");
        solver.pop(1);
    }

    #[test]
    fn register_eval_assigns_next_state_from_its_input() {
        let cfg = crate::solver::default_config();
        let ctx = z3::Context::new(&cfg);
        let solver = SolverCtx::new(&ctx);
        let ts = Rc::new(RefCell::new(TransitionSystem::new(&solver)));
        let lib = NodeLibrary::new(&solver, ts.clone(), 8);

        let Node::Seq(register) = lib
            .register(params(&[("N", 4), ("init", 0), ("setup", 0), ("hold", 0), ("output_delay", 0)]))
            .expect("Register should construct")
        else {
            panic!("Register must be a SeqNode")
        };

        let input = solver.bv_const("reg_input", 4);
        register.eval(&[input.clone()], &ts, &solver).expect("eval should type-check");

        // `trans` unrolled from cycle 0 to cycle 1 must force the register's
        // cycle-1 value to equal its cycle-0 input, mirroring SPEC_FULL.md's
        // register-identity scenario (output@1 == input@0).
        let ts_ref = ts.borrow();
        let unroller = crate::unroller::Unroller::new(&solver, &ts_ref);
        let trans_at_0 = unroller.at_time(&ts_ref.trans(), 0);
        let state_at_1 = unroller.bv_at_time(&register.state_vars.borrow()[0], 1);
        let input_at_0 = unroller.bv_at_time(&input, 0);

        solver.push();
        solver.assert_formula(&trans_at_0);
        solver.assert_formula(&solver.eq_bv(&state_at_1, &input_at_0).not());
        assert!(!solver.check_sat().unwrap(), "trans@0 must force the register's cycle-1 state to equal its cycle-0 input");
        solver.pop(1);
    }

    #[test]
    fn register_timing_setup_is_input_delay_plus_setup_param() {
        let cfg = crate::solver::default_config();
        let ctx = z3::Context::new(&cfg);
        let solver = SolverCtx::new(&ctx);
        let ts = Rc::new(RefCell::new(TransitionSystem::new(&solver)));
        let lib = NodeLibrary::new(&solver, ts, 8);

        let Node::Seq(register) = lib
            .register(params(&[("N", 4), ("init", 0), ("setup", 3), ("hold", 0), ("output_delay", 7)]))
            .expect("Register should construct")
        else {
            panic!("Register must be a SeqNode")
        };

        let input_delay = solver.bv_lit(2, 8);
        let out_delay = register.timing(&[input_delay]).expect("timing should type-check a single delay term");
        assert_bv_eq(&solver, &out_delay[0], &solver.bv_lit(7, 8), "output_delay is the constant params[\"output_delay\"]");

        let setup = register.setup.borrow()[0].clone();
        assert_bv_eq(&solver, &setup, &solver.bv_lit(5, 8), "setup must be input_delay + params[\"setup\"]");
    }

    #[test]
    fn register_timing_hold_can_go_negative() {
        let cfg = crate::solver::default_config();
        let ctx = z3::Context::new(&cfg);
        let solver = SolverCtx::new(&ctx);
        let ts = Rc::new(RefCell::new(TransitionSystem::new(&solver)));
        let lib = NodeLibrary::new(&solver, ts, 8);

        let Node::Seq(register) = lib
            .register(params(&[("N", 4), ("init", 0), ("setup", 0), ("hold", 5), ("output_delay", 0)]))
            .expect("Register should construct")
        else {
            panic!("Register must be a SeqNode")
        };

        // input_delay = 0, hold param = 5: hold = 0 - 5, which must be
        // negative under signed interpretation even though the underlying
        // bit-vector is unsigned two's complement.
        let input_delay = solver.bv_lit(0, 8);
        register.timing(&[input_delay]).expect("timing should type-check a single delay term");
        let hold = register.hold.borrow()[0].clone();

        solver.push();
        let zero = solver.bv_lit_signed(0, 8);
        solver.assert_formula(&hold.bvsge(&zero));
        assert!(!solver.check_sat().unwrap(), "hold = input_delay - params[\"hold\"] must be allowed to go negative under signed arithmetic");
        solver.pop(1);
    }
}
