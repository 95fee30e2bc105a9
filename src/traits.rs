use anyhow::Result;

use crate::ingest::SampleRecord;

/// Source of one sensor's acquisition records, in arrival order.
#[cfg_attr(test, mockall::automock)]
pub trait SampleSource {
    fn load(&self) -> Result<Vec<SampleRecord>>;
}
