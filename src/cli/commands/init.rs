//! # Suite Initialization Module / 套件初始化模块
//!
//! This module provides an interactive command-line wizard that writes a
//! starter `Suite.toml`: run settings plus a couple of example cases on the
//! built-in `none` backend, so the first `case-runner run` works out of the box.
//!
//! 此模块提供交互式命令行向导，用于生成初始的 `Suite.toml`：
//! 包含运行设置以及几个使用内置 `none` 后端的示例用例，
//! 因此第一次执行 `case-runner run` 即可直接运行。

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{Confirm, Input, theme::ColorfulTheme};
use std::fs;
use std::path::Path;

use crate::cli::DEFAULT_SUITE_FILE;
use crate::core::config::{CaseConfig, SuiteConfig};
use crate::core::models::Step;
use crate::infra::t;

/// Runs the interactive wizard to generate a `Suite.toml` file.
///
/// With `non_interactive` set, the default suite is written without any
/// prompt, overwriting an existing file.
///
/// 运行交互式向导以生成 `Suite.toml` 文件。
pub fn run_init_wizard(language: &str, non_interactive: bool) -> Result<()> {
    let config_path = Path::new(DEFAULT_SUITE_FILE);
    let mut suite = default_suite(language);

    if non_interactive {
        return write_config(config_path, &suite, language);
    }

    let theme = ColorfulTheme::default();
    println!("\n{}", t!("init_wizard_welcome", locale = language).cyan().bold());
    println!("{}", t!("init_wizard_description", locale = language));

    if config_path.exists() {
        let confirmation = Confirm::with_theme(&theme)
            .with_prompt(t!("init_overwrite_prompt", locale = language, path = config_path.display()))
            .default(false)
            .interact()
            .context(t!("init_user_confirmation_failed", locale = language).to_string())?;
        if !confirmation {
            println!("{}", t!("init_aborted", locale = language));
            return Ok(());
        }
    }

    suite.run.multi_threading = Confirm::with_theme(&theme)
        .with_prompt(t!("init_multi_threading_prompt", locale = language))
        .default(false)
        .interact()
        .context(t!("init_user_confirmation_failed", locale = language).to_string())?;

    if suite.run.multi_threading {
        let parallelism: usize = Input::with_theme(&theme)
            .with_prompt(t!("init_parallelism_prompt", locale = language))
            .default(num_cpus::get() / 2 + 1)
            .interact_text()
            .context(t!("init_user_confirmation_failed", locale = language).to_string())?;
        suite.run.parallelism = Some(parallelism.max(1));
    }

    suite.run.stop_on_error = Confirm::with_theme(&theme)
        .with_prompt(t!("init_stop_on_error_prompt", locale = language))
        .default(false)
        .interact()
        .context(t!("init_user_confirmation_failed", locale = language).to_string())?;

    suite.retry.enabled = Confirm::with_theme(&theme)
        .with_prompt(t!("init_retry_prompt", locale = language))
        .default(false)
        .interact()
        .context(t!("init_user_confirmation_failed", locale = language).to_string())?;

    if suite.retry.enabled {
        suite.retry.steps_back = Input::with_theme(&theme)
            .with_prompt(t!("init_steps_back_prompt", locale = language))
            .default(0usize)
            .interact_text()
            .context(t!("init_user_confirmation_failed", locale = language).to_string())?;
    }

    write_config(config_path, &suite, language)
}

/// The starter suite: one plain case and one two-step series.
pub fn default_suite(language: &str) -> SuiteConfig {
    let smoke = CaseConfig {
        name: "smoke".to_string(),
        backend: Some("none".to_string()),
        tags: vec!["smoke".to_string()],
        steps: vec![
            Step::new("log").with_param("message", "hello from ${user}"),
            Step::new("assert_eq")
                .with_param("left", "${user}")
                .with_param("right", "demo"),
        ],
        inline_data: Some([("user".to_string(), "demo".to_string())].into_iter().collect()),
        ..CaseConfig::default()
    };
    let login = CaseConfig {
        name: "login".to_string(),
        backend: Some("none".to_string()),
        series: Some("checkout.1".to_string()),
        steps: vec![Step::new("sleep").with_param("ms", "10")],
        ..CaseConfig::default()
    };
    let pay = CaseConfig {
        name: "pay".to_string(),
        backend: Some("none".to_string()),
        series: Some("checkout.2".to_string()),
        steps: vec![Step::new("log").with_param("message", "paid")],
        ..CaseConfig::default()
    };

    SuiteConfig {
        language: language.to_string(),
        cases: vec![smoke, login, pay],
        ..SuiteConfig::default()
    }
}

fn write_config(path: &Path, suite: &SuiteConfig, language: &str) -> Result<()> {
    let toml_string = toml::to_string_pretty(suite)
        .context(t!("init_serialize_failed", locale = language).to_string())?;

    fs::write(path, toml_string)
        .with_context(|| t!("init_write_failed", locale = language, path = path.display()).to_string())?;

    println!(
        "\n{} {}",
        "✔".green(),
        t!("init_success_created", locale = language, path = path.display()).bold()
    );
    println!("{}", t!("init_usage_hint", locale = language));

    Ok(())
}
