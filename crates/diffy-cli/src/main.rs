//! `diffy` command line entry point

use anyhow::Result;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use diffy_cli::commands::{self, AnalyzeArgs, SummarizeArgs};
use diffy_cli::LogFormat;
use std::path::PathBuf;
use std::process::ExitCode;

fn cli() -> Command {
    Command::new("diffy")
        .version(diffy_engine::VERSION)
        .about("Three-way response difference analysis")
        .subcommand_required(true)
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(value_parser!(LogFormat))
                .help("Log output format: text or json"),
        )
        .subcommand(
            Command::new("analyze")
                .about("Analyze a capture file and append the results")
                .arg(
                    Arg::new("input")
                        .long("input")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Capture file, one JSON record per line"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Result file (JSON lines), created if missing"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Configuration file (TOML or YAML)"),
                )
                .arg(
                    Arg::new("run-id")
                        .long("run-id")
                        .help("Run id for every capture"),
                ),
        )
        .subcommand(
            Command::new("summarize")
                .about("Summarize one run from a result file")
                .arg(
                    Arg::new("results")
                        .long("results")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Result file (JSON lines)"),
                )
                .arg(
                    Arg::new("run-id")
                        .long("run-id")
                        .required(true)
                        .help("Run to summarize"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Configuration file, for summary settings"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Validate noise patterns and transformations")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Configuration file (TOML or YAML)"),
                ),
        )
}

fn path(args: &ArgMatches, name: &str) -> Option<PathBuf> {
    args.get_one::<PathBuf>(name).cloned()
}

fn text(args: &ArgMatches, name: &str) -> Option<String> {
    args.get_one::<String>(name).cloned()
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let matches = cli().get_matches();
    let format = matches
        .get_one::<LogFormat>("log-format")
        .copied()
        .unwrap_or_default();
    diffy_cli::logging::init(format)?;

    match matches.subcommand() {
        Some(("analyze", args)) => {
            let args = AnalyzeArgs {
                input: path(args, "input").unwrap_or_default(),
                output: path(args, "output").unwrap_or_default(),
                config: path(args, "config"),
                run_id: text(args, "run-id"),
            };
            let report = commands::analyze(&args).await?;
            let summary = &report.summary;
            println!(
                "analyzed {} requests: {} passed, {} differences (run {}) -> {}",
                summary.total_requests,
                summary.requests_passed,
                summary.total_differences,
                summary.run_id,
                args.output.display()
            );
            if report.skipped > 0 {
                eprintln!("{} malformed capture lines skipped", report.skipped);
            }
            if report.unsaved > 0 {
                eprintln!("{} results could not be saved", report.unsaved);
            }
            if report.skipped > 0 || report.unsaved > 0 {
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(("summarize", args)) => {
            let json = args.get_flag("json");
            let args = SummarizeArgs {
                results: path(args, "results").unwrap_or_default(),
                run_id: text(args, "run-id").unwrap_or_default(),
                config: path(args, "config"),
            };
            let summary = commands::summarize(&args).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", summary.render_text());
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(("check", args)) => {
            let config = path(args, "config").unwrap_or_default();
            let issues = commands::check(&config)?;
            if issues.is_empty() {
                println!("{}: ok", config.display());
                return Ok(ExitCode::SUCCESS);
            }
            for issue in &issues {
                println!("{issue}");
            }
            println!("{}: {} problem(s)", config.display(), issues.len());
            Ok(ExitCode::FAILURE)
        }
        _ => Ok(ExitCode::FAILURE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn test_cli_parses_analyze() {
        let matches = cli()
            .try_get_matches_from([
                "diffy",
                "--log-format",
                "json",
                "analyze",
                "--input",
                "in.jsonl",
                "--output",
                "out.jsonl",
            ])
            .unwrap();
        assert_eq!(
            matches.get_one::<LogFormat>("log-format"),
            Some(&LogFormat::Json)
        );
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "analyze");
        assert_eq!(path(args, "input"), Some(PathBuf::from("in.jsonl")));
        assert_eq!(text(args, "run-id"), None);
    }

    #[test]
    fn test_cli_rejects_unknown_log_format() {
        assert!(cli()
            .try_get_matches_from(["diffy", "--log-format", "xml", "check", "--config", "c.toml"])
            .is_err());
    }
}
