use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint};
use log::LevelFilter;
use std::path::PathBuf;

use labnorm_cli::{run, transfer};
use labnorm_learner::config::{PipelineConfig, TransferConfig};

fn entity_arg() -> Arg {
    Arg::new("entity")
        .short('e')
        .long("entity")
        .help("Only run this entity (repeatable). Defaults to every entity in the config.")
        .action(ArgAction::Append)
        .value_parser(clap::builder::NonEmptyStringValueParser::new())
        .value_hint(ValueHint::Other)
}

fn config_arg(help: &'static str) -> Arg {
    Arg::new("config")
        .help(help)
        .required(true)
        .value_parser(clap::value_parser!(PathBuf))
        .value_hint(ValueHint::FilePath)
}

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("LABNORM_LOG", "error,labnorm=info"))
        .init();

    let matches = Command::new("labnorm")
        .version(clap::crate_version!())
        .about("Lab normality learning pipeline and cross-institution model transfer")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Partition, process, train and score entities of one dataset")
                .arg(config_arg("Path to the pipeline JSON configuration file"))
                .arg(entity_arg()),
        )
        .subcommand(
            Command::new("transfer")
                .about("Apply source-institution models to destination-institution data")
                .arg(config_arg("Path to the transfer JSON configuration file"))
                .arg(entity_arg()),
        )
        .subcommand(
            Command::new("default-config")
                .about("Print a default JSON configuration")
                .arg(
                    Arg::new("kind")
                        .help("Which configuration to print")
                        .required(true)
                        .value_parser(["run", "transfer"]),
                ),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    match matches.subcommand() {
        Some(("run", sub_m)) => handle_run(sub_m),
        Some(("transfer", sub_m)) => handle_transfer(sub_m),
        Some(("default-config", sub_m)) => handle_default_config(sub_m),
        _ => unreachable!("Subcommand is required by CLI configuration"),
    }
}

fn selected_entities(matches: &ArgMatches) -> Vec<String> {
    matches
        .get_many::<String>("entity")
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn handle_run(matches: &ArgMatches) -> Result<()> {
    let config_path: &PathBuf = matches.get_one("config").expect("config is required");
    log::info!("[labnorm::run] Using config: {:?}", config_path);

    let result = run::load_run_config(config_path).and_then(|mut config| {
        run::select_entities(&mut config, &selected_entities(matches))?;
        run::run_pipeline(config)
    });

    match result {
        Ok(summaries) => {
            print!("{}", run::format_summaries(&summaries));
            Ok(())
        }
        Err(e) => {
            log::error!("Pipeline failed: {:#}", e);
            std::process::exit(1)
        }
    }
}

fn handle_transfer(matches: &ArgMatches) -> Result<()> {
    let config_path: &PathBuf = matches.get_one("config").expect("config is required");
    log::info!("[labnorm::transfer] Using config: {:?}", config_path);

    let result = transfer::load_transfer_run_config(config_path).and_then(|mut config| {
        transfer::select_pairs(&mut config, &selected_entities(matches))?;
        transfer::run_transfer(config)
    });

    match result {
        Ok(summaries) => {
            print!("{}", transfer::format_summaries(&summaries));
            Ok(())
        }
        Err(e) => {
            log::error!("Transfer failed: {:#}", e);
            std::process::exit(1)
        }
    }
}

fn handle_default_config(matches: &ArgMatches) -> Result<()> {
    let kind: &String = matches.get_one("kind").expect("kind is required");
    let json = match kind.as_str() {
        "run" => serde_json::to_string_pretty(&PipelineConfig::default())?,
        _ => serde_json::to_string_pretty(&TransferConfig::default())?,
    };
    println!("{}", json);
    Ok(())
}
