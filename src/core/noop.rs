//! # No-op Backend Module / 空操作后端模块
//!
//! The backend behind the `none` type. It drives nothing external and
//! understands a handful of generic actions, which is enough for suites that
//! only check data, run local commands or exercise sequencing.
//!
//! `none` 类型背后的后端。它不驱动任何外部系统，只理解少量通用动作。

use std::process::Command;
use std::thread;
use std::time::Duration;

use crate::core::driver::{Driver, DriverProvider};
use crate::core::error::DriverError;
use crate::core::models::Step;

#[derive(Debug, Default)]
pub struct NoopProvider {
    driver: NoopDriver,
}

impl DriverProvider for NoopProvider {
    fn initialize(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn driver(&mut self) -> &mut dyn Driver {
        &mut self.driver
    }

    fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Actions: `log`, `sleep`, `assert_eq`, `fail`, `command`.
#[derive(Debug, Default)]
pub struct NoopDriver;

impl Driver for NoopDriver {
    fn perform(&mut self, step: &Step) -> Result<String, String> {
        let param = |key: &str| step.params.get(key).map(String::as_str).unwrap_or_default();

        match step.action.as_str() {
            "log" => Ok(param("message").to_string()),
            "sleep" => {
                let ms: u64 = param("ms")
                    .parse()
                    .map_err(|_| format!("sleep: invalid duration '{}'", param("ms")))?;
                thread::sleep(Duration::from_millis(ms));
                Ok(format!("slept {ms}ms"))
            }
            "assert_eq" => {
                let (left, right) = (param("left"), param("right"));
                if left == right {
                    Ok(format!("'{left}' == '{right}'"))
                } else {
                    Err(format!("assertion failed: '{left}' != '{right}'"))
                }
            }
            "fail" => Err(match param("message") {
                "" => "step failed".to_string(),
                message => message.to_string(),
            }),
            "command" => run_command(param("run")),
            other => Err(format!("unsupported action '{other}' for the none backend")),
        }
    }
}

fn run_command(command_line: &str) -> Result<String, String> {
    let parts = shlex::split(command_line)
        .ok_or_else(|| format!("failed to parse command: {command_line}"))?;
    let (program, args) = parts
        .split_first()
        .ok_or_else(|| "empty command".to_string())?;

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| format!("failed to run '{program}': {e}"))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(text)
    } else {
        Err(format!("command exited with {}: {}", output.status, text.trim()))
    }
}
