use std::cell::RefCell;
use std::rc::Rc;

use circuit_synth::nodes::NodeLibrary;
use circuit_synth::solver::SolverCtx;
use circuit_synth::unroller::TransitionSystem;
use circuit_synth::{demo, CircuitProblem, SynthConfig};
use clap::{Args, Parser};

/// Shared timing/horizon knobs every scenario subcommand accepts.
#[derive(Debug, Args)]
struct TimingArgs {
    /// Highest cycle index to unroll (0 unrolls a single cycle).
    #[clap(long, default_value = "3")]
    cycles: u64,

    /// Enforce timing closure instead of pure functional equivalence.
    #[clap(long)]
    enforce_timing: bool,

    /// Cycle time bound for setup, in the circuit's delay units.
    #[clap(long, default_value = "0")]
    cycle_delay: i64,

    /// Per-output maximum combinational delay, required with --enforce-timing.
    #[clap(long, value_delimiter = ',')]
    max_output_delay: Vec<i64>,
}

impl TimingArgs {
    fn into_config(self, num_outputs: usize) -> SynthConfig {
        let config = SynthConfig::new(self.cycles);
        if !self.enforce_timing {
            return config;
        }
        let max_output_delays = if self.max_output_delay.is_empty() {
            vec![self.cycle_delay; num_outputs]
        } else {
            self.max_output_delay
        };
        config.with_timing(None, self.cycle_delay, max_output_delays)
    }
}

#[derive(Debug, Parser)]
#[clap(name = "circuit-synth", about = "CEGIS-based synthesis of timed digital circuits")]
enum CLIArguments {
    /// Synthesize an interconnect summing the current and previous cycle's input.
    TwoInputAdder {
        #[clap(flatten)]
        timing: TimingArgs,
    },
    /// Synthesize a two-deep pipelined reduction over four 4-bit inputs.
    PipelinedReduce {
        #[clap(flatten)]
        timing: TimingArgs,
    },
    /// Synthesize a circuit that recognizes a fixed input sequence two cycles late.
    SequenceDetector {
        #[clap(flatten)]
        timing: TimingArgs,
    },
    /// Synthesize a one-cycle-delayed identity register of the given width.
    RegisterIdentity {
        /// Register width in bits.
        #[clap(long, default_value = "4")]
        width: u32,
        /// Register reset value.
        #[clap(long, default_value = "0")]
        init: i64,
        #[clap(flatten)]
        timing: TimingArgs,
    },
    /// A circuit whose declared output width has no matching source — expected to fail at construction.
    UnsolvableByWidth {
        #[clap(flatten)]
        timing: TimingArgs,
    },
    /// An adder/register pair whose timing budget cannot be met at `cycle_delay = 0`.
    DegenerateTiming {
        #[clap(flatten)]
        timing: TimingArgs,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = CLIArguments::parse();

    // Each scenario needs its own Context/SolverCtx/NodeLibrary triple, built
    // only after we know which scenario we're building nodes for.
    match args {
        CLIArguments::TwoInputAdder { timing } => {
            let ctx = circuit_synth::new_context();
            let solver = SolverCtx::new(&ctx);
            let ts = Rc::new(RefCell::new(TransitionSystem::new(&solver)));
            let lib = NodeLibrary::new(&solver, ts.clone(), 8);
            let problem = demo::two_input_adder(&lib)?;
            run_with(&solver, ts, problem, timing)
        }
        CLIArguments::PipelinedReduce { timing } => {
            let ctx = circuit_synth::new_context();
            let solver = SolverCtx::new(&ctx);
            let ts = Rc::new(RefCell::new(TransitionSystem::new(&solver)));
            let lib = NodeLibrary::new(&solver, ts.clone(), 8);
            let problem = demo::pipelined_reduce(&lib)?;
            run_with(&solver, ts, problem, timing)
        }
        CLIArguments::SequenceDetector { timing } => {
            let ctx = circuit_synth::new_context();
            let solver = SolverCtx::new(&ctx);
            let ts = Rc::new(RefCell::new(TransitionSystem::new(&solver)));
            let lib = NodeLibrary::new(&solver, ts.clone(), 8);
            let problem = demo::sequence_detector_scenario(&lib)?;
            run_with(&solver, ts, problem, timing)
        }
        CLIArguments::RegisterIdentity { width, init, timing } => {
            let ctx = circuit_synth::new_context();
            let solver = SolverCtx::new(&ctx);
            let ts = Rc::new(RefCell::new(TransitionSystem::new(&solver)));
            let lib = NodeLibrary::new(&solver, ts.clone(), 8);
            let problem = demo::register_identity(&lib, width, init)?;
            run_with(&solver, ts, problem, timing)
        }
        CLIArguments::UnsolvableByWidth { timing } => {
            let ctx = circuit_synth::new_context();
            let solver = SolverCtx::new(&ctx);
            let ts = Rc::new(RefCell::new(TransitionSystem::new(&solver)));
            let lib = NodeLibrary::new(&solver, ts.clone(), 8);
            let problem = demo::unsolvable_by_width(&lib)?;
            run_with(&solver, ts, problem, timing)
        }
        CLIArguments::DegenerateTiming { timing } => {
            let ctx = circuit_synth::new_context();
            let solver = SolverCtx::new(&ctx);
            let ts = Rc::new(RefCell::new(TransitionSystem::new(&solver)));
            let lib = NodeLibrary::new(&solver, ts.clone(), 8);
            let problem = demo::degenerate_timing(&lib)?;
            run_with(&solver, ts, problem, timing)
        }
    }
}

fn run_with<'ctx>(
    solver: &SolverCtx<'ctx>,
    ts: Rc<RefCell<TransitionSystem<'ctx>>>,
    problem: CircuitProblem<'ctx>,
    timing: TimingArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = timing.into_config(problem.out_widths.len());
    match circuit_synth::run(solver, ts, 8, problem, config)? {
        Some(interconnect) => println!("{interconnect}"),
        None => println!("no interconnect satisfies the specification within the given horizon"),
    }
    Ok(())
}
