//! # Memory Partitioning
//!
//! Splits physical memory into one partition per discovered core. Partition
//! `slot` belongs to the `slot`-th core in ascending id order; slot 0 is the
//! master's and is never claimed.

use kernel_info::memory::{PAGE_SIZE, PARTITION_GRANULARITY};
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange, RangeError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartitionError {
    #[error("no cores discovered")]
    NoCores,
    #[error("the master core was not among the discovered cores")]
    MasterMissing,
    #[error("{memory_size:#x} bytes cannot be split across {cores} cores")]
    TooLittleMemory { memory_size: u64, cores: usize },
    #[error("slot {slot} is outside {cores} cores")]
    SlotOutOfRange { slot: usize, cores: usize },
    #[error(transparent)]
    Range(#[from] RangeError),
}

/// How physical memory is divided between cores.
pub trait Partitioner {
    /// Bytes reserved for every core, the trailing separator page included.
    ///
    /// # Errors
    /// If `memory_size` cannot be split across `cores`.
    fn partition_size(&self, cores: usize, memory_size: u64) -> Result<u64, PartitionError>;

    /// The claimable partition of the core in `slot`.
    ///
    /// # Errors
    /// If the memory cannot be split or `slot` is not a discovered core.
    fn partition(&self, slot: usize, cores: usize, memory_size: u64) -> Result<PhysicalRange, PartitionError>;
}

/// Equal shares rounded down to [`PARTITION_GRANULARITY`], with the last page
/// of each share left unclaimed.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct EvenPartition;

impl Partitioner for EvenPartition {
    fn partition_size(&self, cores: usize, memory_size: u64) -> Result<u64, PartitionError> {
        if cores == 0 {
            return Err(PartitionError::NoCores);
        }
        let share = memory_size / cores as u64;
        let share = share - share % PARTITION_GRANULARITY;
        if share == 0 {
            return Err(PartitionError::TooLittleMemory { memory_size, cores });
        }
        Ok(share)
    }

    fn partition(&self, slot: usize, cores: usize, memory_size: u64) -> Result<PhysicalRange, PartitionError> {
        let share = self.partition_size(cores, memory_size)?;
        if slot >= cores {
            return Err(PartitionError::SlotOutOfRange { slot, cores });
        }
        let start = PhysicalAddress::new(slot as u64 * share);
        Ok(PhysicalRange::new(start, share - PAGE_SIZE)?)
    }
}

/// Partitioning policies selectable in the configuration.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum PartitionPolicy {
    /// See [`EvenPartition`].
    #[default]
    Even,
}

impl Partitioner for PartitionPolicy {
    fn partition_size(&self, cores: usize, memory_size: u64) -> Result<u64, PartitionError> {
        match self {
            Self::Even => EvenPartition.partition_size(cores, memory_size),
        }
    }

    fn partition(&self, slot: usize, cores: usize, memory_size: u64) -> Result<PhysicalRange, PartitionError> {
        match self {
            Self::Even => EvenPartition.partition(slot, cores, memory_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::memory::MIB;

    #[test]
    fn four_cores_share_64_mib() {
        assert_eq!(EvenPartition.partition_size(4, 64 * MIB), Ok(16 * MIB));
        let core1 = EvenPartition.partition(1, 4, 64 * MIB).unwrap();
        assert_eq!(core1.start().as_u64(), 16 * MIB);
        assert_eq!(core1.size(), 16 * MIB - PAGE_SIZE);
    }

    #[test]
    fn shares_round_down_to_the_granularity() {
        // 100 MiB / 3 = 33.3 MiB -> 32 MiB
        let share = EvenPartition.partition_size(3, 100 * MIB).unwrap();
        assert_eq!(share, 32 * MIB);
        assert!(share.is_multiple_of(PARTITION_GRANULARITY));
        assert!(share * 3 <= 100 * MIB);

        for cores in 1..=9 {
            for memory in [7 * MIB, 64 * MIB, 129 * MIB + 17, 2048 * MIB - 1] {
                if let Ok(share) = EvenPartition.partition_size(cores, memory) {
                    assert!(share.is_multiple_of(4 * MIB));
                    assert!(share * cores as u64 <= memory);
                }
            }
        }
    }

    #[test]
    fn partitions_do_not_overlap() {
        let a = EvenPartition.partition(1, 4, 64 * MIB).unwrap();
        let b = EvenPartition.partition(2, 4, 64 * MIB).unwrap();
        assert!(!a.overlaps(&b));
        assert_eq!(b.start().as_u64() - a.end().as_u64(), PAGE_SIZE);
    }

    #[test]
    fn rejects_impossible_splits() {
        assert_eq!(EvenPartition.partition_size(0, 64 * MIB), Err(PartitionError::NoCores));
        assert_eq!(
            EvenPartition.partition_size(4, 8 * MIB),
            Err(PartitionError::TooLittleMemory {
                memory_size: 8 * MIB,
                cores: 4
            })
        );
        assert_eq!(
            EvenPartition.partition(4, 4, 64 * MIB),
            Err(PartitionError::SlotOutOfRange { slot: 4, cores: 4 })
        );
    }

    #[test]
    fn policy_dispatches_to_even() {
        assert_eq!(
            PartitionPolicy::Even.partition(2, 4, 64 * MIB),
            EvenPartition.partition(2, 4, 64 * MIB)
        );
    }
}
