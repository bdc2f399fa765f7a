use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::circuit::{Circuit, StructuralReport};
use crate::error::CircuitError;
use crate::mna::MnaSystem;
use crate::netlist::{CircuitDescription, NetlistParser};
use crate::solver::{LinearSolver, SolverConfig, SolverStats};

/// Simulation results container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub analysis_type: AnalysisType,
    /// Sweep values, or a single `0.0` for an operating point
    pub points: Vec<f64>,
    pub node_voltages: Vec<Trace>,
    /// Voltage-source branch currents, in the solver's sign convention
    pub source_currents: Vec<Trace>,
    pub resistor_currents: Vec<Trace>,
    pub convergence_info: Vec<ConvergenceInfo>,
    pub total_time: f64,
}

/// One named quantity, one value per point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub name: String,
    pub values: Vec<f64>,
}

impl SimulationResult {
    pub fn node_voltage(&self, name: &str) -> Option<&[f64]> {
        find_trace(&self.node_voltages, name)
    }

    pub fn source_current(&self, name: &str) -> Option<&[f64]> {
        find_trace(&self.source_currents, name)
    }

    pub fn resistor_current(&self, name: &str) -> Option<&[f64]> {
        find_trace(&self.resistor_currents, name)
    }
}

fn find_trace<'a>(traces: &'a [Trace], name: &str) -> Option<&'a [f64]> {
    traces
        .iter()
        .find(|trace| trace.name == name)
        .map(|trace| trace.values.as_slice())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnalysisType {
    Operating,
    DcSweep { source: String, start: f64, stop: f64, step: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceInfo {
    pub point: usize,
    pub residual_norm: f64,
    pub solve_time: f64,
    pub solver_method: String,
}

impl ConvergenceInfo {
    fn from_stats(point: usize, stats: &SolverStats) -> Self {
        ConvergenceInfo {
            point,
            residual_norm: stats.residual_norm,
            solve_time: stats.solve_time,
            solver_method: stats.method_used.to_string(),
        }
    }
}

/// Main simulator engine
pub struct Simulator {
    circuit: Option<Circuit>,
    solver: LinearSolver,
    results: Option<SimulationResult>,
    report: StructuralReport,
    build_errors: Vec<CircuitError>,
    config: SimulatorConfig,
}

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub solver_config: SolverConfig,
    /// Upper bound on the number of DC sweep points
    pub max_sweep_points: usize,
    /// Refuse circuits whose description had rejected declarations
    pub strict_build: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            solver_config: SolverConfig::default(),
            max_sweep_points: 100_000,
            strict_build: false,
        }
    }
}

impl Simulator {
    /// Create a new simulator with default configuration
    pub fn new() -> Self {
        Self::with_config(SimulatorConfig::default())
    }

    /// Create a new simulator with custom configuration
    pub fn with_config(config: SimulatorConfig) -> Self {
        let solver = LinearSolver::with_config(config.solver_config.clone());
        Simulator {
            circuit: None,
            solver,
            results: None,
            report: StructuralReport::default(),
            build_errors: Vec::new(),
            config,
        }
    }

    /// Load a JSON circuit description from file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        info!("Loading circuit from: {}", path.as_ref().display());
        let description = NetlistParser::new().parse_file(path)?;
        self.load_description(&description)
    }

    /// Load from a parsed circuit description
    pub fn load_description(&mut self, description: &CircuitDescription) -> Result<()> {
        let loaded = NetlistParser::new().build(description)?;

        if self.config.strict_build && !loaded.rejected.is_empty() {
            return Err(anyhow!(
                "{} element declarations were rejected, first: {}",
                loaded.rejected.len(),
                loaded.rejected[0]
            ));
        }

        self.install(loaded.circuit, loaded.report, loaded.rejected);
        Ok(())
    }

    /// Load an already built circuit
    pub fn load_circuit(&mut self, circuit: Circuit) {
        let report = circuit.check();
        self.install(circuit, report, Vec::new());
    }

    fn install(&mut self, circuit: Circuit, report: StructuralReport, build_errors: Vec<CircuitError>) {
        report.log_warnings();
        info!("Loaded circuit: {}", circuit.title);
        self.circuit = Some(circuit);
        self.report = report;
        self.build_errors = build_errors;
        self.results = None;
    }

    pub fn circuit(&self) -> Option<&Circuit> {
        self.circuit.as_ref()
    }

    /// Structural report captured when the circuit was loaded
    pub fn structural_report(&self) -> &StructuralReport {
        &self.report
    }

    /// Declarations rejected while building the loaded circuit
    pub fn build_errors(&self) -> &[CircuitError] {
        &self.build_errors
    }

    /// Ground, assemble, solve and write the solution back onto `circuit`
    fn solve_circuit(&self, circuit: &mut Circuit) -> Result<SolverStats> {
        circuit.resolve_ground()?;
        let mut mna_system = MnaSystem::assemble(circuit)?;
        debug!(
            "MNA system: {} unknowns ({} nodes, {} voltage sources)",
            mna_system.size, mna_system.num_nodes, mna_system.num_voltage_sources
        );

        let (solution, stats) = self.solver.solve(&mna_system.matrix, &mna_system.rhs)?;
        mna_system.update_solution(&solution)?;
        mna_system.distribute(circuit)?;
        Ok(stats)
    }

    /// Run operating point analysis
    pub fn run_operating_point(&mut self) -> Result<()> {
        info!("Starting operating point analysis");
        self.results = None;
        let start_time = Instant::now();

        let mut circuit = self.circuit.take().ok_or_else(|| anyhow!("No circuit loaded"))?;
        let outcome = self.solve_circuit(&mut circuit);
        let mut traces = Traces::new(&circuit);
        if outcome.is_ok() {
            traces.record(&circuit);
        }
        self.circuit = Some(circuit);
        let stats = outcome?;

        self.results = Some(traces.finish(
            AnalysisType::Operating,
            vec![0.0],
            vec![ConvergenceInfo::from_stats(0, &stats)],
            start_time.elapsed().as_secs_f64(),
        ));

        info!(
            "Operating point analysis completed in {:.3}ms",
            start_time.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    /// Run DC sweep analysis over the value of one source
    pub fn run_dc_sweep(&mut self, source_name: &str, start: f64, stop: f64, step: f64) -> Result<()> {
        info!(
            "Starting DC sweep analysis: {} from {} to {} step {}",
            source_name, start, stop, step
        );
        self.results = None;
        if step.is_nan() || step <= 0.0 || !start.is_finite() || !stop.is_finite() {
            return Err(anyhow!("Step size must be positive and bounds finite"));
        }

        let start_time = Instant::now();
        let circuit = self.circuit.as_ref().ok_or_else(|| anyhow!("No circuit loaded"))?;
        let source = circuit
            .element_by_name(source_name)
            .ok_or_else(|| anyhow!("Source component '{}' not found", source_name))?;
        if !source.element_type().is_source() {
            return Err(anyhow!("Component '{}' is not a source", source_name));
        }

        let span = stop - start;
        let num_points = (span.abs() / step + 1e-9).floor() as usize + 1;
        if num_points > self.config.max_sweep_points {
            return Err(anyhow!(
                "DC sweep needs {} points, limit is {}",
                num_points,
                self.config.max_sweep_points
            ));
        }
        let direction = if span < 0.0 { -1.0 } else { 1.0 };

        let mut working = circuit.clone();
        let mut traces = Traces::new(&working);
        let mut points = Vec::with_capacity(num_points);
        let mut convergence_info = Vec::with_capacity(num_points);

        for i in 0..num_points {
            let value = start + direction * i as f64 * step;
            debug!("DC sweep point {}: {} = {}", i, source_name, value);

            working.set_source_value(source_name, value)?;
            let stats = self.solve_circuit(&mut working)?;
            traces.record(&working);
            points.push(value);
            convergence_info.push(ConvergenceInfo::from_stats(i, &stats));
        }

        self.results = Some(traces.finish(
            AnalysisType::DcSweep {
                source: source_name.to_string(),
                start,
                stop,
                step,
            },
            points,
            convergence_info,
            start_time.elapsed().as_secs_f64(),
        ));

        info!("DC sweep analysis completed with {} points", num_points);
        Ok(())
    }

    /// Get simulation results
    pub fn results(&self) -> Option<&SimulationResult> {
        self.results.as_ref()
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulates per-point readings in circuit order
struct Traces {
    node_voltages: Vec<Trace>,
    source_currents: Vec<Trace>,
    resistor_currents: Vec<Trace>,
}

impl Traces {
    fn new(circuit: &Circuit) -> Self {
        let named = |name: &str| Trace {
            name: name.to_string(),
            values: Vec::new(),
        };
        Traces {
            node_voltages: circuit.nodes().iter().map(|node| named(&node.name)).collect(),
            source_currents: circuit.voltage_sources().map(|source| named(&source.name)).collect(),
            resistor_currents: circuit.resistors().map(|resistor| named(&resistor.name)).collect(),
        }
    }

    fn record(&mut self, circuit: &Circuit) {
        for (trace, node) in self.node_voltages.iter_mut().zip(circuit.nodes()) {
            trace.values.push(node.voltage);
        }
        for (trace, source) in self.source_currents.iter_mut().zip(circuit.voltage_sources()) {
            trace.values.push(source_current(circuit, &source.name));
        }
        for (trace, resistor) in self.resistor_currents.iter_mut().zip(circuit.resistors()) {
            match circuit.resistor_current(&resistor.name) {
                Some(current) => trace.values.push(current),
                None => warn!("No current for resistor {}", resistor.name),
            }
        }
    }

    fn finish(
        self,
        analysis_type: AnalysisType,
        points: Vec<f64>,
        convergence_info: Vec<ConvergenceInfo>,
        total_time: f64,
    ) -> SimulationResult {
        SimulationResult {
            analysis_type,
            points,
            node_voltages: self.node_voltages,
            source_currents: self.source_currents,
            resistor_currents: self.resistor_currents,
            convergence_info,
            total_time,
        }
    }
}

fn source_current(circuit: &Circuit, name: &str) -> f64 {
    circuit
        .element_id(name)
        .and_then(|id| circuit.element_current(id))
        .unwrap_or(0.0)
}
