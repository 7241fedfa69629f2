// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::num::ParseIntError;

/// Errors raised while decoding a single kernel log record.
///
/// Every variant carries the raw fields prefix so the failing record can be identified in
/// the process' last words.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(
        "unhandled set of fields in kernel message, expected >= 4 fields, got {count}\n{fields}\n{record}"
    )]
    MalformedFields {
        count: usize,
        fields: String,
        record: String,
    },
    #[error("can't parse klog facility prefix in {fields}: {source}")]
    BadPriority {
        fields: String,
        #[source]
        source: ParseIntError,
    },
    #[error("can't parse klog sequence number in {fields}: {source}")]
    BadSequence {
        fields: String,
        #[source]
        source: ParseIntError,
    },
}
