//! Module pass infrastructure.
//!
//! A [`PassManager`] is an ordered collection of [`ModulePass`]es. Adding a
//! pass and running the collection are separate steps so the driver can
//! invoke hooks in between.

use tracing::debug;

use crate::error::PassError;
use crate::ir::Module;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Unchanged,
    Changed,
    /// The pass produced output bytes (emitters).
    Emitted(Vec<u8>),
}

pub trait ModulePass {
    fn name(&self) -> &'static str;

    fn run_on_module(&mut self, module: &mut Module) -> Result<PassOutcome, PassError>;
}

/// Summary of one [`PassManager::run`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PassRun {
    pub changed: bool,
    pub output: Vec<u8>,
}

#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn ModulePass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pass: impl ModulePass + 'static) {
        self.passes.push(Box::new(pass));
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Run every pass in insertion order, stopping at the first failure.
    pub fn run(&mut self, module: &mut Module) -> Result<PassRun, PassError> {
        let mut summary = PassRun::default();
        for pass in &mut self.passes {
            debug!(pass = pass.name(), module = %module.id, "running pass");
            match pass.run_on_module(module)? {
                PassOutcome::Unchanged => {}
                PassOutcome::Changed => summary.changed = true,
                PassOutcome::Emitted(bytes) => summary.output.extend_from_slice(&bytes),
            }
        }
        Ok(summary)
    }
}

impl std::fmt::Debug for PassManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassManager")
            .field("passes", &self.pass_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        outcome: Result<PassOutcome, PassError>,
    }

    impl ModulePass for Record {
        fn name(&self) -> &'static str {
            self.name
        }

        fn run_on_module(&mut self, _module: &mut Module) -> Result<PassOutcome, PassError> {
            self.log.lock().unwrap().push(self.name);
            self.outcome.clone()
        }
    }

    fn record(
        name: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
        outcome: Result<PassOutcome, PassError>,
    ) -> Record {
        Record {
            name,
            log: Arc::clone(log),
            outcome,
        }
    }

    #[test]
    fn runs_passes_in_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pm = PassManager::new();
        pm.add(record("first", &log, Ok(PassOutcome::Unchanged)));
        pm.add(record("second", &log, Ok(PassOutcome::Emitted(b"ab".to_vec()))));
        pm.add(record("third", &log, Ok(PassOutcome::Emitted(b"c".to_vec()))));
        assert_eq!(pm.pass_names(), ["first", "second", "third"]);

        let run = pm.run(&mut Module::new("m")).expect("run");
        assert_eq!(*log.lock().unwrap(), ["first", "second", "third"]);
        assert!(!run.changed);
        assert_eq!(run.output, b"abc");
    }

    #[test]
    fn stops_at_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pm = PassManager::new();
        pm.add(record("ok", &log, Ok(PassOutcome::Changed)));
        pm.add(record("broken", &log, Err(PassError::new("broken", "nope"))));
        pm.add(record("never", &log, Ok(PassOutcome::Unchanged)));

        let err = pm.run(&mut Module::new("m")).unwrap_err();
        assert_eq!(err.pass, "broken");
        assert_eq!(*log.lock().unwrap(), ["ok", "broken"]);
    }
}
