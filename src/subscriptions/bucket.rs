//! Per-partition registry of activation processors.

use super::processor::ProcessorHandle;
use super::types::ProcessorId;
use crate::types::{JobType, Partition, PartitionId};

/// Processors serving one leader partition, at most one per job type.
#[derive(Debug)]
pub struct PartitionBucket {
    partition: Partition,
    service_name: String,
    processors: Vec<ProcessorHandle>,
}

impl PartitionBucket {
    pub fn new(partition: Partition, service_name: impl Into<String>) -> Self {
        Self {
            partition,
            service_name: service_name.into(),
            processors: Vec::new(),
        }
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition.id
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Linear scan; partitions carry few job types.
    pub fn by_job_type(&self, job_type: &JobType) -> Option<&ProcessorHandle> {
        self.processors.iter().find(|p| p.job_type() == job_type)
    }

    pub fn add_processor(&mut self, processor: ProcessorHandle) {
        debug_assert!(self.by_job_type(processor.job_type()).is_none());
        self.processors.push(processor);
    }

    /// Detach a processor. Returns it if it was registered here.
    pub fn remove_processor(&mut self, id: ProcessorId) -> Option<ProcessorHandle> {
        let position = self.processors.iter().position(|p| p.id() == id)?;
        Some(self.processors.remove(position))
    }

    pub fn contains(&self, id: ProcessorId) -> bool {
        self.processors.iter().any(|p| p.id() == id)
    }

    pub fn processors(&self) -> impl Iterator<Item = &ProcessorHandle> {
        self.processors.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub(crate) fn into_processors(self) -> Vec<ProcessorHandle> {
        self.processors
    }
}
