pub mod builder;
pub mod circuit;
pub mod cli;
pub mod error;
pub mod mna;
pub mod netlist;
pub mod output;
pub mod simulator;
pub mod solver;

// Re-export commonly used types
pub use builder::TerminalBuilder;
pub use circuit::{Circuit, Element, ElementId, ElementKind, ElementType, Node, NodeId, StructuralReport};
pub use error::{CircuitError, CircuitResult};
pub use mna::MnaSystem;
pub use netlist::NetlistParser;
pub use simulator::{SimulationResult, Simulator};
pub use solver::LinearSolver;

// Error types
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
