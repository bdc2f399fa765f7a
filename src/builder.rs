//! Two-call terminal declaration.
//!
//! Every element is declared twice under the same name, once per terminal.
//! Resistors take their positive terminal on the first call and their
//! negative terminal on the second, both carrying the same resistance.
//! Sources pick the terminal from the sign of the value: a negative value
//! (including `-0.0`) binds the negative terminal. Elements with a single
//! known terminal are staged here and committed to the [`Circuit`] once the
//! second terminal arrives.

use log::{debug, warn};

use crate::circuit::{check_resistance, check_source_value, Circuit, ElementKind, ElementType, NodeId, StructuralReport};
use crate::error::{CircuitError, CircuitResult};

#[derive(Debug, Clone, PartialEq)]
struct PendingElement {
    name: String,
    kind: ElementType,
    /// Resistance, or source magnitude
    value: f64,
    positive: Option<NodeId>,
    negative: Option<NodeId>,
    /// Position among all first declarations
    declared: usize,
}

impl PendingElement {
    fn nodes(&self) -> impl Iterator<Item = NodeId> {
        self.positive.into_iter().chain(self.negative)
    }
}

/// Which terminal a declaration binds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    Positive,
    Negative,
}

impl Terminal {
    fn for_source(value: f64) -> Self {
        if value.is_sign_negative() {
            Terminal::Negative
        } else {
            Terminal::Positive
        }
    }
}

/// Incremental circuit construction through per-terminal declarations
#[derive(Debug, Clone)]
pub struct TerminalBuilder {
    circuit: Circuit,
    pending: Vec<PendingElement>,
    declarations: usize,
    /// First-declaration positions of committed sources, in branch order
    voltage_order: Vec<usize>,
    current_order: Vec<usize>,
}

impl TerminalBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        TerminalBuilder {
            circuit: Circuit::new(title),
            pending: Vec::new(),
            declarations: 0,
            voltage_order: Vec::new(),
            current_order: Vec::new(),
        }
    }

    pub fn add_node(&mut self, name: impl Into<String>) -> NodeId {
        self.circuit.add_node(name)
    }

    pub fn add_resistor(&mut self, name: &str, node_name: &str, value: f64) -> CircuitResult<()> {
        self.declare(ElementType::Resistor, name, node_name, value)
    }

    pub fn add_voltage_source(&mut self, name: &str, node_name: &str, value: f64) -> CircuitResult<()> {
        self.declare(ElementType::VoltageSource, name, node_name, value)
    }

    pub fn add_current_source(&mut self, name: &str, node_name: &str, value: f64) -> CircuitResult<()> {
        self.declare(ElementType::CurrentSource, name, node_name, value)
    }

    fn declare(&mut self, kind: ElementType, name: &str, node_name: &str, value: f64) -> CircuitResult<()> {
        let node = self.circuit.node_id(node_name).ok_or_else(|| CircuitError::UnknownNode {
            node: node_name.to_string(),
        })?;

        if let Some(existing) = self.circuit.element_by_name(name) {
            let existing = existing.element_type();
            if existing != kind {
                return Err(kind_mismatch(name, existing, kind));
            }
            return Err(CircuitError::conflict(name, "already has both nodes assigned"));
        }

        match self.pending.iter().position(|pending| pending.name == name) {
            Some(index) => self.complete(index, kind, node, value),
            None => self.stage(kind, name, node, value),
        }
    }

    fn stage(&mut self, kind: ElementType, name: &str, node: NodeId, value: f64) -> CircuitResult<()> {
        let terminal = match kind {
            ElementType::Resistor => {
                check_resistance(name, value)?;
                Terminal::Positive
            }
            ElementType::VoltageSource | ElementType::CurrentSource => {
                check_source_value(name, value)?;
                Terminal::for_source(value)
            }
        };

        let (positive, negative) = match terminal {
            Terminal::Positive => (Some(node), None),
            Terminal::Negative => (None, Some(node)),
        };
        debug!("Staging {} {} with {:?} terminal", kind, name, terminal);
        self.pending.push(PendingElement {
            name: name.to_string(),
            kind,
            value: value.abs(),
            positive,
            negative,
            declared: self.declarations,
        });
        self.declarations += 1;
        Ok(())
    }

    fn complete(&mut self, index: usize, kind: ElementType, node: NodeId, value: f64) -> CircuitResult<()> {
        let pending = &self.pending[index];
        if pending.kind != kind {
            return Err(kind_mismatch(&pending.name, pending.kind, kind));
        }

        let terminal = match kind {
            ElementType::Resistor => {
                if value != pending.value {
                    return Err(CircuitError::conflict(
                        &pending.name,
                        format!("value mismatch ({} vs {})", pending.value, value),
                    ));
                }
                Terminal::Negative
            }
            ElementType::VoltageSource | ElementType::CurrentSource => {
                if value.abs() != pending.value {
                    return Err(CircuitError::conflict(
                        &pending.name,
                        format!("value mismatch ({} vs {})", pending.value, value.abs()),
                    ));
                }
                Terminal::for_source(value)
            }
        };

        let (positive, negative) = match (terminal, pending.positive, pending.negative) {
            (Terminal::Negative, Some(positive), None) => (positive, node),
            (Terminal::Positive, None, Some(negative)) => (node, negative),
            _ => {
                return Err(CircuitError::conflict(
                    &pending.name,
                    format!("{:?} terminal is already assigned", terminal).to_lowercase(),
                ))
            }
        };

        let element = match kind {
            ElementType::Resistor => ElementKind::Resistor {
                resistance: pending.value,
            },
            ElementType::VoltageSource => ElementKind::VoltageSource {
                voltage: pending.value,
                branch: 0,
                current: 0.0,
            },
            ElementType::CurrentSource => ElementKind::CurrentSource {
                current: pending.value,
                branch: 0,
            },
        };

        // Sources keep first-declaration order, which fixes their branch rows
        let name = pending.name.clone();
        let declared = pending.declared;
        let slot = self
            .source_order(kind)
            .map(|order| order.partition_point(|&seq| seq < declared));
        self.circuit.insert_between(&name, positive, negative, element, slot)?;
        if let (Some(order), Some(slot)) = (self.source_order(kind), slot) {
            order.insert(slot, declared);
        }
        self.pending.remove(index);
        Ok(())
    }

    fn source_order(&mut self, kind: ElementType) -> Option<&mut Vec<usize>> {
        match kind {
            ElementType::VoltageSource => Some(&mut self.voltage_order),
            ElementType::CurrentSource => Some(&mut self.current_order),
            ElementType::Resistor => None,
        }
    }

    /// Circuit built from the completed declarations so far
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// Names of elements with only one terminal declared, in declaration order
    pub fn incomplete_elements(&self) -> Vec<String> {
        self.pending.iter().map(|pending| pending.name.clone()).collect()
    }

    /// Structural-consistency check over committed and staged elements
    pub fn check(&self) -> StructuralReport {
        let mut report = self.circuit.check();
        report.isolated_nodes = self
            .circuit
            .nodes()
            .iter()
            .filter(|node| node.is_isolated())
            .filter(|node| !self.pending.iter().any(|pending| pending.nodes().any(|id| id == node.id)))
            .map(|node| node.name.clone())
            .collect();
        report.incomplete_elements = self.incomplete_elements();
        report
    }

    /// Finish building. Staged elements missing a terminal are dropped.
    pub fn finish(self) -> (Circuit, StructuralReport) {
        let report = self.check();
        for pending in &self.pending {
            warn!("Dropping element {}: missing a terminal", pending.name);
        }
        (self.circuit, report)
    }
}

fn kind_mismatch(name: &str, existing: ElementType, requested: ElementType) -> CircuitError {
    CircuitError::KindMismatch {
        element: name.to_string(),
        existing: existing.as_str(),
        requested: requested.as_str(),
    }
}
