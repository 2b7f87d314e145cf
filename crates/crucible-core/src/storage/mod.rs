use crate::model::{TestResult, TestRun};

pub mod schema;
pub mod store;

pub use store::Store;

/// Storage boundary: the engine emits each finalized result and every run
/// status change through this collaborator. Implementations decide the
/// persistence technology.
pub trait RunSink: Send + Sync {
    fn save_result(&self, result: &TestResult) -> anyhow::Result<()>;
    fn update_run(&self, run: &TestRun) -> anyhow::Result<()>;
}

/// Discards everything. For runs that only need live metrics.
pub struct NullSink;

impl RunSink for NullSink {
    fn save_result(&self, _result: &TestResult) -> anyhow::Result<()> {
        Ok(())
    }

    fn update_run(&self, _run: &TestRun) -> anyhow::Result<()> {
        Ok(())
    }
}
