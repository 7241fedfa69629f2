// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding of a single `/dev/kmsg` record.
//!
//! Format reference: <https://www.kernel.org/doc/Documentation/ABI/testing/dev-kmsg>

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::errors::DecodeError;
use crate::escape::decode_escapes;
use crate::priority;

const FIELDS_TERMINATOR: u8 = b';';
const MESSAGE_TERMINATOR: u8 = b'\n';
const MIN_FIELDS: usize = 4;
// label blocks this short cannot hold a KEY=value line
const MIN_LABELS_LEN: usize = 3;

/// A decoded kernel log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    pub sequence: i64,
    pub facility: &'static str,
    pub severity: &'static str,
    pub message: String,
    /// Continuation lines (`KEY=value`) in the order the kernel emitted them.
    pub labels: Vec<String>,
    /// Wall clock time at which the record was decoded. The kernel's own timestamp field
    /// is monotonic time since boot and is not used.
    pub read_timestamp: DateTime<Utc>,
}

/// Decodes the bytes returned by one device read.
///
/// Only the priority and sequence fields are interpreted; the remaining fields must be
/// present but are otherwise ignored.
pub fn decode(raw: &[u8]) -> Result<ParsedEvent, DecodeError> {
    let (raw_fields, rest) = match raw.iter().position(|&b| b == FIELDS_TERMINATOR) {
        Some(at) => (&raw[..at], &raw[at + 1..]),
        None => (&raw[..0], raw),
    };
    let (raw_message, raw_labels) = match rest.iter().position(|&b| b == MESSAGE_TERMINATOR) {
        Some(at) => (&rest[..at], &rest[at + 1..]),
        None => (rest, &rest[rest.len()..]),
    };

    let read_timestamp = Utc::now();
    let fields_text = String::from_utf8_lossy(raw_fields);
    let fields: Vec<&str> = fields_text.split(',').collect();
    if fields.len() < MIN_FIELDS {
        return Err(DecodeError::MalformedFields {
            count: fields.len(),
            fields: fields_text.to_string(),
            record: String::from_utf8_lossy(raw).into_owned(),
        });
    }

    let prio = fields[0]
        .parse::<u64>()
        .map_err(|source| DecodeError::BadPriority {
            fields: fields_text.to_string(),
            source,
        })?;
    let sequence = fields[1]
        .parse::<i64>()
        .map_err(|source| DecodeError::BadSequence {
            fields: fields_text.to_string(),
            source,
        })?;

    let event = ParsedEvent {
        sequence,
        facility: priority::facility(prio),
        severity: priority::severity(prio),
        message: decode_escapes(raw_message.to_vec()),
        labels: parse_labels(raw_labels),
        read_timestamp,
    };
    trace!("Decoded kernel record {}", event.sequence);
    Ok(event)
}

fn parse_labels(raw: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = trim_label(&text);
    if trimmed.len() <= MIN_LABELS_LEN {
        return Vec::new();
    }
    trimmed
        .split('\n')
        .map(|line| trim_label(line).to_string())
        .collect()
}

fn trim_label(text: &str) -> &str {
    text.trim_matches(|c| c == '\n' || c == ' ')
}
