use std::collections::HashMap;
use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{CircuitError, CircuitResult};

/// Dense, 0-based node index assigned at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Dense, 0-based element index assigned at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub usize);

/// Represents a junction in the circuit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub is_ground: bool,
    pub voltage: f64,
    elements: Vec<ElementId>,
}

impl Node {
    fn new(id: NodeId, name: String) -> Self {
        Node {
            id,
            name,
            is_ground: false,
            voltage: 0.0,
            elements: Vec::new(),
        }
    }

    /// Incident elements in attachment order
    pub fn elements(&self) -> &[ElementId] {
        &self.elements
    }

    pub fn is_isolated(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Kind tag of a two-terminal element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Resistor,
    VoltageSource,
    CurrentSource,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Resistor => "resistor",
            ElementType::VoltageSource => "voltage source",
            ElementType::CurrentSource => "current source",
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, ElementType::VoltageSource | ElementType::CurrentSource)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific payload of an element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ElementKind {
    Resistor {
        resistance: f64,
    },
    VoltageSource {
        voltage: f64,
        /// Position among voltage sources, offsets the branch row by `n`
        branch: usize,
        /// Solved branch current, in the solver's sign convention
        current: f64,
    },
    CurrentSource {
        current: f64,
        /// Position among current sources
        branch: usize,
    },
}

impl ElementKind {
    pub fn element_type(&self) -> ElementType {
        match self {
            ElementKind::Resistor { .. } => ElementType::Resistor,
            ElementKind::VoltageSource { .. } => ElementType::VoltageSource,
            ElementKind::CurrentSource { .. } => ElementType::CurrentSource,
        }
    }

    /// Nominal value: ohms, volts or amps
    pub fn value(&self) -> f64 {
        match *self {
            ElementKind::Resistor { resistance } => resistance,
            ElementKind::VoltageSource { voltage, .. } => voltage,
            ElementKind::CurrentSource { current, .. } => current,
        }
    }
}

/// Two-terminal circuit element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    pub kind: ElementKind,
    pub positive: NodeId,
    pub negative: NodeId,
}

impl Element {
    pub fn element_type(&self) -> ElementType {
        self.kind.element_type()
    }

    pub fn value(&self) -> f64 {
        self.kind.value()
    }

    /// The terminal opposite to `node`, if `node` is one of ours
    pub fn other_node(&self, node: NodeId) -> Option<NodeId> {
        if self.positive == node {
            Some(self.negative)
        } else if self.negative == node {
            Some(self.positive)
        } else {
            None
        }
    }

    pub fn conductance(&self) -> Option<f64> {
        match self.kind {
            ElementKind::Resistor { resistance } => Some(1.0 / resistance),
            _ => None,
        }
    }
}

/// Findings of the structural-consistency check.
///
/// Informational only; a circuit with findings can still be assembled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralReport {
    /// Nodes with no incident element
    pub isolated_nodes: Vec<String>,
    /// Elements still missing one of their terminals
    pub incomplete_elements: Vec<String>,
    /// Node names that were added more than once
    pub duplicate_node_names: Vec<String>,
}

impl StructuralReport {
    pub fn is_clean(&self) -> bool {
        self.isolated_nodes.is_empty()
            && self.incomplete_elements.is_empty()
            && self.duplicate_node_names.is_empty()
    }

    /// Emit every finding as a warning
    pub fn log_warnings(&self) {
        for node in &self.isolated_nodes {
            warn!("Node {} has no elements", node);
        }
        for element in &self.incomplete_elements {
            warn!("Element {} has missing nodes", element);
        }
        for node in &self.duplicate_node_names {
            warn!("Node name {} is used by more than one node", node);
        }
    }
}

impl fmt::Display for StructuralReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(f, "no structural issues");
        }
        let mut lines = Vec::new();
        for node in &self.isolated_nodes {
            lines.push(format!("node {} has no elements", node));
        }
        for element in &self.incomplete_elements {
            lines.push(format!("element {} has missing nodes", element));
        }
        for node in &self.duplicate_node_names {
            lines.push(format!("node name {} is used more than once", node));
        }
        write!(f, "{}", lines.join("\n"))
    }
}

/// Complete circuit representation
///
/// Owns every node and element; incidence and terminals are expressed as
/// indices into the two arenas.
#[derive(Debug, Clone, Serialize)]
pub struct Circuit {
    pub title: String,
    nodes: Vec<Node>,
    elements: Vec<Element>,
    voltage_sources: Vec<ElementId>,
    current_sources: Vec<ElementId>,
    ground: Option<NodeId>,
}

impl Circuit {
    /// Create an empty circuit
    pub fn new(title: impl Into<String>) -> Self {
        Circuit {
            title: title.into(),
            nodes: Vec::new(),
            elements: Vec::new(),
            voltage_sources: Vec::new(),
            current_sources: Vec::new(),
            ground: None,
        }
    }

    /// Add a node and return its id.
    ///
    /// Names are not deduplicated: adding an existing name creates a second,
    /// distinct node, and name lookups keep resolving to the first one.
    pub fn add_node(&mut self, name: impl Into<String>) -> NodeId {
        let name = name.into();
        let id = NodeId(self.nodes.len());
        if self.node_id(&name).is_some() {
            warn!("Node name {} added more than once (new id {})", name, id.0);
        }
        self.invalidate_ground();
        self.nodes.push(Node::new(id, name));
        id
    }

    /// Add a resistor of `ohms` between two named nodes
    pub fn add_resistor(&mut self, name: &str, pos: &str, neg: &str, ohms: f64) -> CircuitResult<ElementId> {
        check_resistance(name, ohms)?;
        self.insert(name, pos, neg, ElementKind::Resistor { resistance: ohms })
    }

    /// Add an independent voltage source, `V(pos) - V(neg) = volts`
    pub fn add_voltage_source(&mut self, name: &str, pos: &str, neg: &str, volts: f64) -> CircuitResult<ElementId> {
        check_source_value(name, volts)?;
        let kind = ElementKind::VoltageSource {
            voltage: volts,
            branch: 0,
            current: 0.0,
        };
        self.insert(name, pos, neg, kind)
    }

    /// Add an independent current source pushing `amps` into its positive node
    pub fn add_current_source(&mut self, name: &str, pos: &str, neg: &str, amps: f64) -> CircuitResult<ElementId> {
        check_source_value(name, amps)?;
        let kind = ElementKind::CurrentSource {
            current: amps,
            branch: 0,
        };
        self.insert(name, pos, neg, kind)
    }

    fn insert(&mut self, name: &str, pos: &str, neg: &str, kind: ElementKind) -> CircuitResult<ElementId> {
        let positive = self.require_node(pos)?;
        let negative = self.require_node(neg)?;
        self.insert_between(name, positive, negative, kind, None)
    }

    /// Add an element between two nodes already resolved to ids.
    ///
    /// Sources go to position `slot` of their kind's list, or to the end when
    /// `slot` is `None`. Branch indices follow list order.
    pub(crate) fn insert_between(
        &mut self,
        name: &str,
        positive: NodeId,
        negative: NodeId,
        kind: ElementKind,
        slot: Option<usize>,
    ) -> CircuitResult<ElementId> {
        if self.element_id(name).is_some() {
            return Err(CircuitError::DuplicateElement {
                element: name.to_string(),
            });
        }
        if positive == negative {
            return Err(CircuitError::SelfLoop {
                element: name.to_string(),
                node: self.nodes[positive.0].name.clone(),
            });
        }

        let id = ElementId(self.elements.len());
        match kind.element_type() {
            ElementType::VoltageSource => place_source(&mut self.voltage_sources, id, slot),
            ElementType::CurrentSource => place_source(&mut self.current_sources, id, slot),
            ElementType::Resistor => {}
        }
        debug!(
            "Adding {} {} ({}) between {} and {}",
            kind.element_type(),
            name,
            kind.value(),
            self.nodes[positive.0].name,
            self.nodes[negative.0].name
        );

        self.invalidate_ground();
        self.elements.push(Element {
            name: name.to_string(),
            kind,
            positive,
            negative,
        });
        self.nodes[positive.0].elements.push(id);
        self.nodes[negative.0].elements.push(id);
        self.renumber_branches();
        Ok(id)
    }

    fn renumber_branches(&mut self) {
        for (index, id) in self.voltage_sources.iter().enumerate() {
            if let ElementKind::VoltageSource { branch, .. } = &mut self.elements[id.0].kind {
                *branch = index;
            }
        }
        for (index, id) in self.current_sources.iter().enumerate() {
            if let ElementKind::CurrentSource { branch, .. } = &mut self.elements[id.0].kind {
                *branch = index;
            }
        }
    }

    fn require_node(&self, name: &str) -> CircuitResult<NodeId> {
        self.node_id(name).ok_or_else(|| CircuitError::UnknownNode {
            node: name.to_string(),
        })
    }

    fn invalidate_ground(&mut self) {
        if let Some(ground) = self.ground.take() {
            self.nodes[ground.0].is_ground = false;
        }
    }

    /// Get node ID by name (first node with that name)
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|node| node.name == name).map(|node| node.id)
    }

    /// Get node by ID
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Get node by name (first node with that name)
    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.node_id(name).and_then(|id| self.node(id))
    }

    /// All nodes in id order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Get element ID by name
    pub fn element_id(&self, name: &str) -> Option<ElementId> {
        self.elements
            .iter()
            .position(|element| element.name == name)
            .map(ElementId)
    }

    /// Get element by ID
    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id.0)
    }

    /// Get element by name
    pub fn element_by_name(&self, name: &str) -> Option<&Element> {
        self.element_id(name).and_then(|id| self.element(id))
    }

    /// All elements in insertion order
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Voltage sources in creation (branch) order
    pub fn voltage_sources(&self) -> impl Iterator<Item = &Element> + '_ {
        self.voltage_sources.iter().map(|id| &self.elements[id.0])
    }

    /// Current sources in creation (branch) order
    pub fn current_sources(&self) -> impl Iterator<Item = &Element> + '_ {
        self.current_sources.iter().map(|id| &self.elements[id.0])
    }

    /// Resistors in insertion order
    pub fn resistors(&self) -> impl Iterator<Item = &Element> + '_ {
        self.elements
            .iter()
            .filter(|element| element.element_type() == ElementType::Resistor)
    }

    /// Number of MNA branch rows
    pub fn num_voltage_sources(&self) -> usize {
        self.voltage_sources.len()
    }

    /// Reference node, once resolved
    pub fn ground(&self) -> Option<NodeId> {
        self.ground
    }

    /// Pick the reference node and pin it at 0 V.
    ///
    /// Without voltage sources the last-added node becomes ground, otherwise
    /// the negative terminal of the last-added voltage source.
    pub fn resolve_ground(&mut self) -> CircuitResult<NodeId> {
        let ground = match self.voltage_sources.last() {
            Some(source) => self.elements[source.0].negative,
            None => self
                .nodes
                .last()
                .map(|node| node.id)
                .ok_or_else(|| CircuitError::singular("circuit has no nodes"))?,
        };

        self.invalidate_ground();
        let node = &mut self.nodes[ground.0];
        node.is_ground = true;
        node.voltage = 0.0;
        self.ground = Some(ground);

        debug!("Ground node: {} (id {})", node.name, ground.0);
        Ok(ground)
    }

    /// Update the nominal value of a voltage or current source
    pub fn set_source_value(&mut self, name: &str, value: f64) -> CircuitResult<()> {
        check_source_value(name, value)?;
        let id = self.element_id(name).ok_or_else(|| CircuitError::UnknownElement {
            element: name.to_string(),
        })?;
        match &mut self.elements[id.0].kind {
            ElementKind::VoltageSource { voltage, .. } => *voltage = value,
            ElementKind::CurrentSource { current, .. } => *current = value,
            ElementKind::Resistor { .. } => {
                return Err(CircuitError::KindMismatch {
                    element: name.to_string(),
                    existing: ElementType::Resistor.as_str(),
                    requested: "source",
                })
            }
        }
        Ok(())
    }

    pub(crate) fn set_node_voltage(&mut self, id: NodeId, voltage: f64) {
        self.nodes[id.0].voltage = voltage;
    }

    pub(crate) fn set_source_current(&mut self, id: ElementId, solved: f64) {
        if let ElementKind::VoltageSource { current, .. } = &mut self.elements[id.0].kind {
            *current = solved;
        }
    }

    pub(crate) fn voltage_source_ids(&self) -> &[ElementId] {
        &self.voltage_sources
    }

    /// Voltage across an element, `V(pos) - V(neg)`
    pub fn element_voltage(&self, id: ElementId) -> Option<f64> {
        let element = self.element(id)?;
        Some(self.nodes[element.positive.0].voltage - self.nodes[element.negative.0].voltage)
    }

    /// Current through an element.
    ///
    /// Resistors follow the solver convention `-(V_pos - V_neg) / R`, voltage
    /// sources report their solved branch current and current sources their
    /// nominal value.
    pub fn element_current(&self, id: ElementId) -> Option<f64> {
        let element = self.element(id)?;
        match element.kind {
            ElementKind::Resistor { resistance } => Some(-self.element_voltage(id)? / resistance),
            ElementKind::VoltageSource { current, .. } => Some(current),
            ElementKind::CurrentSource { current, .. } => Some(current),
        }
    }

    /// Ohm's-law current of a named resistor
    pub fn resistor_current(&self, name: &str) -> Option<f64> {
        let id = self.element_id(name)?;
        match self.elements[id.0].kind {
            ElementKind::Resistor { .. } => self.element_current(id),
            _ => None,
        }
    }

    /// Structural-consistency check. Does not mutate the circuit.
    pub fn check(&self) -> StructuralReport {
        let isolated_nodes = self
            .nodes
            .iter()
            .filter(|node| node.is_isolated())
            .map(|node| node.name.clone())
            .collect();

        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut duplicate_node_names = Vec::new();
        for node in &self.nodes {
            let count = seen.entry(node.name.as_str()).or_insert(0);
            *count += 1;
            if *count == 2 {
                duplicate_node_names.push(node.name.clone());
            }
        }

        StructuralReport {
            isolated_nodes,
            incomplete_elements: Vec::new(),
            duplicate_node_names,
        }
    }

    /// Print circuit summary
    pub fn print_summary(&self) {
        println!("Circuit: {}", self.title);
        println!("Nodes: {}", self.nodes.len());
        println!("Elements: {}", self.elements.len());

        if let Some(ground) = self.ground.and_then(|id| self.node(id)) {
            println!("Ground node: {}", ground.name);
        }

        let mut type_counts: Vec<(ElementType, usize)> = Vec::new();
        for element in &self.elements {
            match type_counts.iter_mut().find(|(kind, _)| *kind == element.element_type()) {
                Some((_, count)) => *count += 1,
                None => type_counts.push((element.element_type(), 1)),
            }
        }
        for (kind, count) in type_counts {
            println!("  {}: {}", kind, count);
        }
    }
}

fn place_source(list: &mut Vec<ElementId>, id: ElementId, slot: Option<usize>) {
    let index = slot.map_or(list.len(), |slot| slot.min(list.len()));
    list.insert(index, id);
}

pub(crate) fn check_resistance(name: &str, ohms: f64) -> CircuitResult<()> {
    if ohms.is_finite() && ohms > 0.0 {
        Ok(())
    } else {
        Err(CircuitError::InvalidValue {
            element: name.to_string(),
            value: ohms,
            reason: "resistance must be positive and finite",
        })
    }
}

pub(crate) fn check_source_value(name: &str, value: f64) -> CircuitResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CircuitError::InvalidValue {
            element: name.to_string(),
            value,
            reason: "source value must be finite",
        })
    }
}
