// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Forwards kernel log records from `/dev/kmsg` to a Kafka topic.
//!
//! Every record read from the device is decoded, rendered as a single JSON object and
//! produced onto one partition chosen by hashing the node's partition key, so records from
//! one machine stay in kernel sequence order. Any failure along the way is fatal.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod error;
pub mod hostname;
pub mod logger;
pub mod partitioner;
pub mod pipeline;
pub mod producer;
pub mod serializer;

pub use error::ForwarderError;
