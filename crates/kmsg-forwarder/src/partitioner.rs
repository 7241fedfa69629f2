// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed partition assignment.
//!
//! The partition key is hashed once at startup and every message produced by the process
//! goes to the resulting partition. Combined with a single in-flight request this gives
//! the broker a total order over one host's kernel log. Partitions must never be derived
//! per message.

use std::fmt;

use crate::error::ForwarderError;

const FNV32_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a hash.
#[must_use]
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV32_OFFSET_BASIS, |hash, &byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV32_PRIME)
    })
}

/// A partition number, guaranteed to be within `[0, partition_count)` of the topic it was
/// assigned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionAssignment(i32);

impl PartitionAssignment {
    #[must_use]
    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for PartitionAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hash of a partition key, computed once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionAssigner {
    hash: u32,
}

impl PartitionAssigner {
    #[must_use]
    pub fn new(key: &str) -> Self {
        PartitionAssigner {
            hash: fnv1a_32(key.as_bytes()),
        }
    }

    /// Reduces the key hash onto `partition_count` partitions.
    ///
    /// The hash is kept unsigned for the reduction so keys hashing above `i32::MAX` still
    /// land on a valid partition.
    pub fn assign(&self, partition_count: i32) -> Result<PartitionAssignment, ForwarderError> {
        let count = u32::try_from(partition_count)
            .ok()
            .filter(|&count| count > 0)
            .ok_or_else(|| {
                ForwarderError::Config(format!(
                    "topic must have at least one partition, got {partition_count}"
                ))
            })?;
        let partition = i32::try_from(self.hash % count).map_err(|_| {
            ForwarderError::Config(format!("partition out of range for {partition_count}"))
        })?;
        Ok(PartitionAssignment(partition))
    }
}

/// Maps `key` onto one of `partition_count` partitions.
pub fn assign(key: &str, partition_count: i32) -> Result<PartitionAssignment, ForwarderError> {
    PartitionAssigner::new(key).assign(partition_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fnv1a_32_reference_values() {
        assert_eq!(fnv1a_32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a_32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a_32(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_hash_with_sign_bit_set() {
        // FNV-1a("a") has its high bit set; as an i32 it would be negative.
        assert!(fnv1a_32(b"a") > i32::MAX as u32);
        let partition = assign("a", 7).unwrap();
        assert_eq!(partition.get(), (0xe40c_292c_u32 % 7) as i32);
    }

    #[test]
    fn test_single_partition() {
        assert_eq!(assign("node-1", 1).unwrap().get(), 0);
    }

    #[test]
    fn test_rejects_empty_topic() {
        assert!(matches!(assign("node-1", 0), Err(ForwarderError::Config(_))));
        assert!(matches!(assign("node-1", -4), Err(ForwarderError::Config(_))));
    }

    proptest! {
        #[test]
        fn test_assignment_in_range(key in ".*", count in 1i32..=i32::MAX) {
            let partition = assign(&key, count).unwrap().get();
            prop_assert!(partition >= 0);
            prop_assert!(partition < count);
        }

        #[test]
        fn test_assignment_is_stable(key in ".*", count in 1i32..1024) {
            let assigner = PartitionAssigner::new(&key);
            prop_assert_eq!(assigner.assign(count).unwrap(), assign(&key, count).unwrap());
            prop_assert_eq!(assigner.assign(count).unwrap(), assigner.assign(count).unwrap());
        }
    }
}
