// src/cli.rs
use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use std::{env, path::PathBuf};

use crate::infra::{logging, t};

pub mod commands;

use commands::run::RunOverrides;

/// The suite file read when `--suite` is not given.
pub const DEFAULT_SUITE_FILE: &str = "Suite.toml";

/// Pre-parses the command line arguments to find the language setting.
/// This allows i18n to be initialized before the full CLI is built.
/// It looks for a `--lang <VALUE>` argument.
fn pre_parse_language() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    args.iter()
        .position(|arg| arg == "--lang")
        .and_then(|pos| args.get(pos + 1))
        .cloned()
}

fn build_cli(locale: &str) -> Command {
    Command::new("case-runner")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli_about", locale = locale).to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("cli_lang", locale = locale).to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help(t!("arg_log_level", locale = locale).to_string())
                .value_name("LEVEL")
                .global(true)
                .action(ArgAction::Set),
        )
        .subcommand(
            Command::new("run")
                .about(t!("cmd_run_about", locale = locale).to_string())
                .arg(
                    Arg::new("suite")
                        .short('s')
                        .long("suite")
                        .help(t!("arg_suite", locale = locale).to_string())
                        .value_name("SUITE")
                        .default_value(DEFAULT_SUITE_FILE)
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .help(t!("arg_jobs", locale = locale).to_string())
                        .value_name("JOBS")
                        .value_parser(clap::value_parser!(usize))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("tag")
                        .short('t')
                        .long("tag")
                        .help(t!("arg_tag", locale = locale).to_string())
                        .value_name("TAG")
                        .allow_hyphen_values(true)
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("select")
                        .long("select")
                        .help(t!("arg_select", locale = locale).to_string())
                        .value_name("ID")
                        .value_delimiter(',')
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("retry")
                        .long("retry")
                        .help(t!("arg_retry", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("steps-back")
                        .long("steps-back")
                        .help(t!("arg_steps_back", locale = locale).to_string())
                        .value_name("N")
                        .value_parser(clap::value_parser!(usize))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("stop-on-error")
                        .long("stop-on-error")
                        .help(t!("arg_stop_on_error", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("keep-driver-on-error")
                        .long("keep-driver-on-error")
                        .help(t!("arg_keep_driver_on_error", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("init")
                .about(t!("cmd_init_about", locale = locale).to_string())
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .help(t!("arg_non_interactive", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
}

pub async fn run() -> Result<()> {
    // Pre-parse language and initialize i18n first.
    let language = match pre_parse_language() {
        Some(lang) => {
            let lang = crate::match_locale(&lang);
            rust_i18n::set_locale(lang);
            lang
        }
        None => crate::init(),
    };

    let matches = build_cli(language).get_matches();
    logging::init(matches.get_one::<String>("log-level").map(String::as_str));

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let suite = run_matches
                .get_one::<PathBuf>("suite")
                .cloned()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SUITE_FILE));
            let overrides = RunOverrides {
                language: matches.get_one::<String>("lang").cloned(),
                jobs: run_matches.get_one::<usize>("jobs").copied(),
                tags: run_matches
                    .get_many::<String>("tag")
                    .map(|tags| tags.cloned().collect())
                    .unwrap_or_default(),
                selection: run_matches
                    .get_many::<String>("select")
                    .map(|ids| ids.cloned().collect()),
                retry: run_matches.get_flag("retry"),
                steps_back: run_matches.get_one::<usize>("steps-back").copied(),
                stop_on_error: run_matches.get_flag("stop-on-error"),
                keep_driver_on_error: run_matches.get_flag("keep-driver-on-error"),
            };
            commands::run::execute(suite, overrides).await?;
        }
        Some(("init", init_matches)) => {
            let non_interactive = init_matches.get_flag("non-interactive");
            if matches.get_one::<String>("lang").is_none() && !non_interactive {
                println!(
                    "{}",
                    t!("system_language_detected", locale = language, lang = language)
                );
            }
            commands::init::run_init_wizard(language, non_interactive)?;
        }
        _ => {
            // Clap will have already printed help info.
        }
    }
    Ok(())
}
