use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::LevelFilter;

use crate::netlist::parse_value;
use crate::output::OutputFormat;
use crate::solver::SolverMethod;

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub input_file: String,
    pub output_file: Option<String>,
    pub analysis_type: AnalysisType,
    pub output_format: OutputFormat,
    pub solver_method: SolverMethod,
    pub check_only: bool,
    pub strict: bool,
    pub verbose_level: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisType {
    Operating,
    DcSweep { source: String, start: f64, stop: f64, step: f64 },
}

pub fn create_cli() -> Command {
    Command::new("dcsim")
        .version(crate::VERSION)
        .about("DC circuit solver based on Modified Nodal Analysis")
        .arg(
            Arg::new("input")
                .help("Input circuit description (.json)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output file for simulation results"),
        )
        .arg(
            Arg::new("dc")
                .long("dc")
                .value_names(["SOURCE", "START", "STOP", "STEP"])
                .num_args(4)
                .allow_hyphen_values(true)
                .help("DC sweep analysis over a source value"),
        )
        .arg(
            Arg::new("solver")
                .long("solver")
                .value_name("METHOD")
                .default_value("lu")
                .value_parser(["lu", "qr"])
                .help("Dense solver used for A·x = z"),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .action(ArgAction::SetTrue)
                .help("Only print the structural-consistency report"),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .action(ArgAction::SetTrue)
                .help("Fail when any element declaration is rejected"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase verbosity level"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .default_value("csv")
                .value_parser(["csv", "json"])
                .help("Output format"),
        )
}

impl CliArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let input_file = matches
            .get_one::<String>("input")
            .ok_or_else(|| anyhow!("Input file is required"))?
            .clone();

        let output_file = matches.get_one::<String>("output").cloned();

        let verbose_level = matches.get_count("verbose");

        let output_format = match matches.get_one::<String>("format").map(String::as_str) {
            Some("csv") | None => OutputFormat::Csv,
            Some("json") => OutputFormat::Json,
            Some(other) => return Err(anyhow!("Invalid output format: {}", other)),
        };

        let solver_method = matches
            .get_one::<String>("solver")
            .map_or(Ok(SolverMethod::Lu), |method| method.parse::<SolverMethod>())
            .map_err(|e| anyhow!(e))?;

        let analysis_type = if let Some(dc_values) = matches.get_many::<String>("dc") {
            let values: Vec<&String> = dc_values.collect();
            if values.len() != 4 {
                return Err(anyhow!("DC sweep requires exactly 4 parameters: source, start, stop, step"));
            }

            let source = values[0].clone();
            let start = parse_value(values[1])?;
            let stop = parse_value(values[2])?;
            let step = parse_value(values[3])?;

            if step <= 0.0 {
                return Err(anyhow!("Step size must be positive"));
            }

            AnalysisType::DcSweep { source, start, stop, step }
        } else {
            // Default to operating point analysis
            AnalysisType::Operating
        };

        Ok(CliArgs {
            input_file,
            output_file,
            analysis_type,
            output_format,
            solver_method,
            check_only: matches.get_flag("check"),
            strict: matches.get_flag("strict"),
            verbose_level,
        })
    }

    /// Log level for the given number of `-v` flags
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose_level {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs> {
        let matches = create_cli().try_get_matches_from(args)?;
        CliArgs::from_matches(&matches)
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["dcsim", "circuit.json"]).unwrap();
        assert_eq!(args.input_file, "circuit.json");
        assert_eq!(args.analysis_type, AnalysisType::Operating);
        assert_eq!(args.output_format, OutputFormat::Csv);
        assert_eq!(args.solver_method, SolverMethod::Lu);
        assert!(!args.check_only);
        assert_eq!(args.log_level(), LevelFilter::Warn);
    }

    #[test]
    fn test_dc_sweep_arguments() {
        let args = parse(&["dcsim", "c.json", "--dc", "V1", "0", "1.5k", "500", "-vv", "-f", "json"]).unwrap();
        assert_eq!(
            args.analysis_type,
            AnalysisType::DcSweep {
                source: "V1".to_string(),
                start: 0.0,
                stop: 1500.0,
                step: 500.0,
            }
        );
        assert_eq!(args.output_format, OutputFormat::Json);
        assert_eq!(args.log_level(), LevelFilter::Debug);
    }

    #[test]
    fn test_dc_sweep_accepts_negative_bounds() {
        let args = parse(&["dcsim", "c.json", "--dc", "V1", "-5", "5", "1"]).unwrap();
        assert_eq!(
            args.analysis_type,
            AnalysisType::DcSweep {
                source: "V1".to_string(),
                start: -5.0,
                stop: 5.0,
                step: 1.0,
            }
        );

        let args = parse(&["dcsim", "c.json", "--dc", "I1", "2m", "-2m", "1m", "-v"]).unwrap();
        assert_eq!(
            args.analysis_type,
            AnalysisType::DcSweep {
                source: "I1".to_string(),
                start: 2e-3,
                stop: -2e-3,
                step: 1e-3,
            }
        );
        assert_eq!(args.log_level(), LevelFilter::Info);
    }

    #[test]
    fn test_rejects_non_positive_step() {
        assert!(parse(&["dcsim", "c.json", "--dc", "V1", "0", "1", "0"]).is_err());
        assert!(parse(&["dcsim", "c.json", "--dc", "V1", "0", "1", "-1"]).is_err());
    }

    #[test]
    fn test_solver_and_flags() {
        let args = parse(&["dcsim", "c.json", "--solver", "qr", "--check", "--strict"]).unwrap();
        assert_eq!(args.solver_method, SolverMethod::Qr);
        assert!(args.check_only);
        assert!(args.strict);
        assert!(parse(&["dcsim", "c.json", "--solver", "cg"]).is_err());
    }
}
