use std::path::Path;

use colored::*;
use log::{error, info};

use dcsim::cli::{self, create_cli, CliArgs};
use dcsim::netlist::NetlistParser;
use dcsim::output;
use dcsim::simulator::{Simulator, SimulatorConfig};
use dcsim::solver::SolverConfig;

fn main() {
    let args = match CliArgs::from_matches(&create_cli().get_matches()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", format!("Error: {}", e).red());
            std::process::exit(2);
        }
    };

    env_logger::Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .init();

    if let Err(e) = run_application(&args) {
        error!("{}", format!("Error: {:#}", e).red());
        std::process::exit(1);
    }
}

fn run_application(args: &CliArgs) -> anyhow::Result<()> {
    info!("{}", "Starting dcsim - DC circuit solver".green().bold());
    info!("Input file: {}", args.input_file.bright_blue());

    // Validate input file exists
    if !Path::new(&args.input_file).exists() {
        return Err(anyhow::anyhow!("Input file '{}' not found", args.input_file));
    }

    if args.check_only {
        let parser = NetlistParser::new();
        let loaded = parser.build(&parser.parse_file(&args.input_file)?)?;
        output::print_check(&loaded.circuit, &loaded.report, &loaded.rejected);
        return Ok(());
    }

    let config = SimulatorConfig {
        solver_config: SolverConfig {
            method: args.solver_method,
            ..SolverConfig::default()
        },
        strict_build: args.strict,
        ..SimulatorConfig::default()
    };
    let mut simulator = Simulator::with_config(config);
    simulator.load_file(&args.input_file)?;

    match &args.analysis_type {
        cli::AnalysisType::DcSweep { source, start, stop, step } => {
            info!(
                "Running DC sweep: source={}, range=[{}, {}], step={}",
                source, start, stop, step
            );
            simulator.run_dc_sweep(source, *start, *stop, *step)?;
        }
        cli::AnalysisType::Operating => {
            info!("Running operating point analysis");
            simulator.run_operating_point()?;
        }
    }

    let results = simulator
        .results()
        .ok_or_else(|| anyhow::anyhow!("No simulation results available"))?;

    // Export results
    if let Some(output_file) = &args.output_file {
        output::export_results(results, output_file, args.output_format)?;
        info!("Results exported to: {}", output_file.bright_green());
    } else {
        output::print_summary(results);
    }

    info!("{}", "Simulation completed successfully!".green().bold());
    Ok(())
}
