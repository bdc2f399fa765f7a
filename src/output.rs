use std::fs::File;
use std::path::Path;

use anyhow::Result;
use colored::*;
use csv::Writer;
use log::info;

use crate::circuit::{Circuit, ElementType, StructuralReport};
use crate::error::CircuitError;
use crate::simulator::{AnalysisType, SimulationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

/// Export simulation results to file
pub fn export_results(results: &SimulationResult, path: impl AsRef<Path>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Csv => export_csv(results, path.as_ref()),
        OutputFormat::Json => export_json(results, path.as_ref()),
    }
}

/// Header of the first CSV column
fn point_label(results: &SimulationResult) -> String {
    match &results.analysis_type {
        AnalysisType::Operating => "point".to_string(),
        AnalysisType::DcSweep { source, .. } => source.clone(),
    }
}

/// Export results to CSV format, one row per point
fn export_csv(results: &SimulationResult, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = Writer::from_writer(file);

    let mut header = vec![point_label(results)];
    header.extend(results.node_voltages.iter().map(|trace| format!("V({})", trace.name)));
    header.extend(results.source_currents.iter().map(|trace| format!("I({})", trace.name)));
    header.extend(results.resistor_currents.iter().map(|trace| format!("I({})", trace.name)));
    writer.write_record(&header)?;

    let traces = results
        .node_voltages
        .iter()
        .chain(&results.source_currents)
        .chain(&results.resistor_currents);
    for (i, point) in results.points.iter().enumerate() {
        let mut record = vec![point.to_string()];
        for trace in traces.clone() {
            record.push(trace.values.get(i).copied().unwrap_or(0.0).to_string());
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    info!("Results exported to CSV: {}", path.display());
    Ok(())
}

/// Export results to JSON format
fn export_json(results: &SimulationResult, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, results)?;

    info!("Results exported to JSON: {}", path.display());
    Ok(())
}

/// Print simulation summary
pub fn print_summary(results: &SimulationResult) {
    println!("\n{}", "=== Simulation Summary ===".bold());
    match &results.analysis_type {
        AnalysisType::Operating => println!("Analysis type: operating point"),
        AnalysisType::DcSweep { source, start, stop, step } => {
            println!("Analysis type: DC sweep of {} from {} to {} step {}", source, start, stop, step)
        }
    }
    println!("Total simulation time: {:.3}ms", results.total_time * 1000.0);
    println!("Number of points: {}", results.points.len());

    if !results.node_voltages.is_empty() {
        println!("\nNode voltages (final values):");
        for trace in &results.node_voltages {
            if let Some(voltage) = trace.values.last() {
                println!("  V({}): {}", trace.name.bright_blue(), format!("{:.6}V", voltage).green());
            }
        }
    }

    if !results.source_currents.is_empty() {
        println!("\nSource currents (final values):");
        for trace in &results.source_currents {
            if let Some(current) = trace.values.last() {
                println!("  I({}): {}", trace.name.bright_blue(), format!("{:.6}A", current).green());
            }
        }
    }

    if !results.resistor_currents.is_empty() {
        println!("\nResistor currents (final values):");
        for trace in &results.resistor_currents {
            if let Some(current) = trace.values.last() {
                println!("  I({}): {}", trace.name.bright_blue(), format!("{:.6}A", current).green());
            }
        }
    }

    if !results.convergence_info.is_empty() {
        let total = results.convergence_info.len();
        let worst = results
            .convergence_info
            .iter()
            .map(|info| info.residual_norm)
            .fold(0.0f64, f64::max);
        println!("\nSolver info:");
        println!("  Solves: {}", total);
        println!("  Worst residual norm: {:.2e}", worst);
    }
}

/// Print the structural-consistency report and the rejected declarations
pub fn print_check(circuit: &Circuit, report: &StructuralReport, rejected: &[CircuitError]) {
    println!("{}", "=== Circuit Check ===".bold());
    circuit.print_summary();

    println!("\nNodes:");
    for node in circuit.nodes() {
        let names: Vec<&str> = node
            .elements()
            .iter()
            .filter_map(|&id| circuit.element(id))
            .map(|element| element.name.as_str())
            .collect();
        println!("  {} (ID: {}) elements: {}", node.name, node.id.0, names.join(" "));
    }

    println!("\nElements:");
    for element in circuit.elements() {
        let pos = circuit.node(element.positive).map_or("?", |node| node.name.as_str());
        let neg = circuit.node(element.negative).map_or("?", |node| node.name.as_str());
        let unit = match element.element_type() {
            ElementType::Resistor => "ohm",
            ElementType::VoltageSource => "V",
            ElementType::CurrentSource => "A",
        };
        println!("  {} {} pos: {} neg: {}", element.name, format!("{}{}", element.value(), unit).cyan(), pos, neg);
    }

    if report.is_clean() && rejected.is_empty() {
        println!("\n{}", "No structural issues".green());
        return;
    }
    println!();
    if !report.is_clean() {
        for line in report.to_string().lines() {
            println!("  {} {}", "warning:".yellow().bold(), line);
        }
    }
    for err in rejected {
        println!("  {} {}", "rejected:".red().bold(), err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::Simulator;

    fn solved() -> SimulationResult {
        let mut circuit = Circuit::new("export");
        circuit.add_node("a");
        circuit.add_node("gnd");
        circuit.add_voltage_source("V1", "a", "gnd", 2.0).unwrap();
        circuit.add_resistor("R1", "a", "gnd", 4.0).unwrap();

        let mut simulator = Simulator::new();
        simulator.load_circuit(circuit);
        simulator.run_dc_sweep("V1", 0.0, 2.0, 1.0).unwrap();
        simulator.results().unwrap().clone()
    }

    #[test]
    fn test_export_csv() {
        let results = solved();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        export_results(&results, &path, OutputFormat::Csv).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "V1,V(a),V(gnd),I(V1),I(R1)");
        assert_eq!(lines.len(), 4);
        assert!(lines[3].starts_with("2,2,0,"));
    }

    #[test]
    fn test_export_json() {
        let results = solved();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        export_results(&results, &path, OutputFormat::Json).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: SimulationResult = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.points, results.points);
        assert_eq!(parsed.node_voltages, results.node_voltages);
    }
}
