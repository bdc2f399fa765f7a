use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::builder::TerminalBuilder;
use crate::circuit::{Circuit, StructuralReport};
use crate::error::CircuitError;

lazy_static! {
    static ref VALUE_PATTERN: Regex = Regex::new(
        r"^\s*([+-]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?)\s*([a-zA-Z]*)\s*$"
    ).unwrap();
}

/// JSON circuit description: node records and element records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitDescription {
    #[serde(default)]
    pub title: Option<String>,
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub elements: Vec<ElementRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ElementRecordType,
    pub value: RecordValue,
    #[serde(rename = "posNode")]
    pub pos_node: String,
    #[serde(rename = "negNode")]
    pub neg_node: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementRecordType {
    #[serde(rename = "RESISTOR")]
    Resistor,
    #[serde(rename = "VOLTAGE_SUPPLY")]
    VoltageSupply,
    #[serde(rename = "CURRENT_SUPPLY")]
    CurrentSupply,
}

/// A plain number, or a string with an SI suffix such as `"4.7k"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordValue {
    Number(f64),
    Text(String),
}

impl RecordValue {
    pub fn resolve(&self) -> Result<f64> {
        match self {
            RecordValue::Number(value) => Ok(*value),
            RecordValue::Text(text) => parse_value(text),
        }
    }
}

/// Outcome of building a circuit from a description
#[derive(Debug, Clone)]
pub struct LoadedCircuit {
    pub circuit: Circuit,
    pub report: StructuralReport,
    /// Declarations rejected while building; the rest of the circuit was kept
    pub rejected: Vec<CircuitError>,
}

#[derive(Debug, Default)]
pub struct NetlistParser;

impl NetlistParser {
    pub fn new() -> Self {
        NetlistParser
    }

    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<CircuitDescription> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read file '{}': {}", path.display(), e))?;
        self.parse_str(&content)
            .with_context(|| format!("Invalid circuit description in '{}'", path.display()))
    }

    pub fn parse_str(&self, content: &str) -> Result<CircuitDescription> {
        Ok(serde_json::from_str(content)?)
    }

    /// Build a circuit, declaring every element once per terminal.
    ///
    /// Sources are declared with `value` on their positive node and `-value`
    /// on their negative node. Rejected declarations are logged and
    /// collected, and do not stop the build.
    pub fn build(&self, description: &CircuitDescription) -> Result<LoadedCircuit> {
        let title = description.title.clone().unwrap_or_else(|| "Untitled circuit".to_string());
        let mut builder = TerminalBuilder::new(title);

        for node in &description.nodes {
            builder.add_node(node.name.clone());
        }

        let mut rejected = Vec::new();
        for element in &description.elements {
            let value = element
                .value
                .resolve()
                .with_context(|| format!("Element '{}' has an unreadable value", element.name))?;

            let name = element.name.as_str();
            let declarations = match element.kind {
                ElementRecordType::Resistor => [
                    builder.add_resistor(name, &element.pos_node, value),
                    builder.add_resistor(name, &element.neg_node, value),
                ],
                ElementRecordType::VoltageSupply => [
                    builder.add_voltage_source(name, &element.pos_node, value),
                    builder.add_voltage_source(name, &element.neg_node, -value),
                ],
                ElementRecordType::CurrentSupply => [
                    builder.add_current_source(name, &element.pos_node, value),
                    builder.add_current_source(name, &element.neg_node, -value),
                ],
            };

            for err in declarations.into_iter().filter_map(|result| result.err()) {
                warn!("Rejected declaration: {}", err);
                rejected.push(err);
            }
        }

        let (circuit, report) = builder.finish();
        info!(
            "Built circuit '{}': {} nodes, {} elements, {} rejected declarations",
            circuit.title,
            circuit.nodes().len(),
            circuit.elements().len(),
            rejected.len()
        );

        Ok(LoadedCircuit {
            circuit,
            report,
            rejected,
        })
    }
}

/// Parse a value with an optional SI multiplier and unit, e.g. `"1.5k"`,
/// `"10mA"`, `"2.2MEG"`, `"5V"`
pub fn parse_value(value: &str) -> Result<f64> {
    let captures = VALUE_PATTERN
        .captures(value)
        .ok_or_else(|| anyhow!("Invalid value: '{}'", value))?;
    let number = captures[1].parse::<f64>()?;
    let suffix = captures[2].to_lowercase();

    let mut prefix = suffix.as_str();
    for unit in ["ohm", "v", "a"] {
        if let Some(stripped) = prefix.strip_suffix(unit) {
            prefix = stripped;
            break;
        }
    }

    let multiplier = match prefix {
        "f" => 1e-15,
        "p" => 1e-12,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "meg" => 1e6,
        "g" => 1e9,
        "t" => 1e12,
        "" => 1.0,
        _ => return Err(anyhow!("Unknown unit: {}", suffix)),
    };

    Ok(number * multiplier)
}
