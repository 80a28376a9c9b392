//! Decoder: turns a solved CEGIS assignment into the human- and
//! machine-readable interconnect.
//!
//! The assignment the CEGIS driver returns pairs each E-variable term with
//! its model value; the decoder's job is just name-based lookup back into
//! the circuit encoding's own lvar terms, since `E` already enumerates every
//! lvar that matters except the circuit-input lvars (those are literals, not
//! search variables, and never appear in an assignment).

use std::collections::HashMap;
use std::fmt;

use prettytable::*;
use z3::ast::BV;

use crate::cegis::Assignment;
use crate::encoding::CircuitEncoding;
use crate::error::{Result, SynthError};

/// The lvars feeding one operator instance's ports.
#[derive(Debug, Clone)]
pub struct OpConnections {
    pub name: String,
    pub input_lvars: Vec<u64>,
    pub output_lvars: Vec<u64>,
}

/// For every sink in the circuit, which source line feeds it: the decoded
/// straight-line program the synthesizer found.
#[derive(Debug, Clone)]
pub struct Interconnect {
    pub input_lvars: Vec<u64>,
    pub ops: Vec<OpConnections>,
    pub output_lvars: Vec<u64>,
}

impl Interconnect {
    /// Reads every lvar's value out of `assignment` and pairs it with the
    /// circuit topology `encoding` describes.
    pub fn decode<'ctx>(encoding: &CircuitEncoding<'ctx>, assignment: &Assignment<'ctx>) -> Result<Self> {
        let lookup: HashMap<String, u64> = assignment.iter().map(|(term, value)| (term.to_string(), *value)).collect();
        let get = |term: &BV<'ctx>| -> Result<u64> {
            lookup
                .get(&term.to_string())
                .copied()
                .ok_or_else(|| SynthError::Solver(format!("no assignment for lvar {term}")))
        };

        let input_lvars: Vec<u64> = (0..encoding.num_inputs as u64).collect();

        let mut ops = Vec::with_capacity(encoding.ops().len());
        for (i, op) in encoding.ops().iter().enumerate() {
            let input_lvars = encoding.op_input_lvars[i].iter().map(get).collect::<Result<Vec<_>>>()?;
            let output_lvars = encoding.op_output_lvars[i].iter().map(get).collect::<Result<Vec<_>>>()?;
            ops.push(OpConnections {
                name: op.name().to_string(),
                input_lvars,
                output_lvars,
            });
        }

        let output_lvars = encoding.output_lvars.iter().map(get).collect::<Result<Vec<_>>>()?;

        Ok(Interconnect { input_lvars, ops, output_lvars })
    }

    /// Describes what produces line `lvar`: a circuit input, or a named
    /// op's output port.
    fn describe_line(&self, lvar: u64) -> String {
        if (lvar as usize) < self.input_lvars.len() {
            return format!("input[{lvar}]");
        }
        for op in &self.ops {
            for (port, &l) in op.output_lvars.iter().enumerate() {
                if l == lvar {
                    return format!("{}.out[{port}]", op.name);
                }
            }
        }
        format!("line[{lvar}]")
    }
}

impl fmt::Display for Interconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table = Table::new();
        table.add_row(row!["sink", "source line"]);
        for (i, op) in self.ops.iter().enumerate() {
            for (port, &lvar) in op.input_lvars.iter().enumerate() {
                table.add_row(row![format!("{}#{i}.in[{port}]", op.name), self.describe_line(lvar)]);
            }
        }
        for (i, &lvar) in self.output_lvars.iter().enumerate() {
            table.add_row(row![format!("output[{i}]"), self.describe_line(lvar)]);
        }
        write!(f, "{table}")
    }
}
