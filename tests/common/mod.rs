// Shared test helpers for integration tests
#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use case_runner::core::driver::{Driver, DriverProvider};
use case_runner::core::error::DriverError;
use case_runner::core::models::{
    BackendType, DataRow, InstanceId, Step, TestCaseDefinition, TestCaseInstance,
};
use case_runner::core::noop::NoopDriver;
use tempfile::TempDir;

/// Writes `content` as `Suite.toml` in the temp dir and returns its path.
pub fn write_suite(temp_dir: &TempDir, content: &str) -> PathBuf {
    let path = temp_dir.path().join("Suite.toml");
    fs::write(&path, content).expect("Failed to write Suite.toml");
    path
}

pub fn write_file(temp_dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = temp_dir.path().join(name);
    fs::write(&path, content).expect("Failed to write fixture");
    path
}

pub fn row(pairs: &[(&str, &str)]) -> DataRow {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A definition on the `none` backend with the given steps.
pub fn definition(name: &str, steps: Vec<Step>) -> TestCaseDefinition {
    TestCaseDefinition {
        steps,
        ..TestCaseDefinition::new(name)
    }
}

pub fn log_step(message: &str) -> Step {
    Step::new("log").with_param("message", message)
}

pub fn fail_step(message: &str) -> Step {
    Step::new("fail").with_param("message", message)
}

pub fn sleep_step(ms: u64) -> Step {
    Step::new("sleep").with_param("ms", ms.to_string())
}

/// A single, row-less instance of `definition`.
pub fn instance(definition: TestCaseDefinition) -> TestCaseInstance {
    TestCaseInstance {
        id: InstanceId::new(definition.name.clone(), None),
        definition: Arc::new(definition),
        row: None,
        correlation_id: None,
        start_step: 0,
    }
}

/// Counts provider lifecycle calls across all workers.
#[derive(Debug, Default)]
pub struct LifecycleCounters {
    pub created: AtomicUsize,
    pub initialized: AtomicUsize,
    pub closed: AtomicUsize,
}

impl LifecycleCounters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn initialized(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A provider that behaves like the no-op backend but records its lifecycle
/// and can be told to fail initialization.
pub struct CountingProvider {
    counters: Arc<LifecycleCounters>,
    fail_init: bool,
    driver: NoopDriver,
}

impl CountingProvider {
    pub fn boxed(counters: Arc<LifecycleCounters>, fail_init: bool) -> Box<dyn DriverProvider> {
        counters.created.fetch_add(1, Ordering::SeqCst);
        Box::new(Self {
            counters,
            fail_init,
            driver: NoopDriver,
        })
    }
}

impl DriverProvider for CountingProvider {
    fn initialize(&mut self) -> Result<(), DriverError> {
        if self.fail_init {
            return Err(DriverError::Initialization("device not reachable".to_string()));
        }
        self.counters.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn driver(&mut self) -> &mut dyn Driver {
        &mut self.driver
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A definition bound to `backend`.
pub fn on_backend(mut definition: TestCaseDefinition, backend: BackendType) -> TestCaseDefinition {
    definition.backend = backend;
    definition
}
