// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! JSON rendering of kernel events.
//!
//! Downstream consumers rely on the field order, so the payload is written by hand:
//!
//! ```text
//! {<static labels...>,"seq":N,"facility":"..","severity":"..","message":"..","timestamp":"..","metadata":[..]}
//! ```
//!
//! `metadata` is omitted when the record carried no labels.

use chrono::{DateTime, Utc};
use kmsg::ParsedEvent;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct EventSerializer {
    // `{` followed by every static label, each with a trailing comma
    prefix: String,
}

impl EventSerializer {
    #[must_use]
    pub fn new(static_labels: &[(String, String)]) -> Self {
        let mut prefix = String::from("{");
        for (key, value) in static_labels {
            push_json_str(&mut prefix, key);
            prefix.push(':');
            push_json_str(&mut prefix, value);
            prefix.push(',');
        }
        EventSerializer { prefix }
    }

    #[must_use]
    pub fn serialize(&self, event: &ParsedEvent) -> String {
        let mut out = String::with_capacity(self.prefix.len() + event.message.len() + 128);
        out.push_str(&self.prefix);

        out.push_str("\"seq\":");
        out.push_str(&event.sequence.to_string());
        out.push_str(",\"facility\":");
        push_json_str(&mut out, event.facility);
        out.push_str(",\"severity\":");
        push_json_str(&mut out, event.severity);
        out.push_str(",\"message\":");
        push_json_str(&mut out, &event.message);
        out.push_str(",\"timestamp\":");
        push_json_str(&mut out, &rfc3339_nano(&event.read_timestamp));

        if !event.labels.is_empty() {
            out.push_str(",\"metadata\":[");
            for (i, label) in event.labels.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_json_str(&mut out, label);
            }
            out.push(']');
        }

        out.push('}');
        out
    }
}

/// RFC 3339 in UTC with the fraction of a second trimmed of trailing zeros, and left out
/// entirely when zero: `2020-09-13T12:26:40.12Z`, `2020-09-13T12:26:40Z`.
fn rfc3339_nano(timestamp: &DateTime<Utc>) -> String {
    let mut text = timestamp.format("%Y-%m-%dT%H:%M:%S").to_string();
    // leap seconds are reported as nanos past one second
    let nanos = timestamp.timestamp_subsec_nanos() % 1_000_000_000;
    if nanos > 0 {
        let fraction = format!("{nanos:09}");
        text.push('.');
        text.push_str(fraction.trim_end_matches('0'));
    }
    text.push('Z');
    text
}

fn push_json_str(out: &mut String, text: &str) {
    out.push_str(&Value::from(text).to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn oom_event() -> ParsedEvent {
        ParsedEvent {
            sequence: 1234,
            facility: "kern",
            severity: "info",
            message: "Out of memory: Kill process 1234".to_string(),
            labels: vec!["SUBSYSTEM=vmalloc".to_string()],
            read_timestamp: Utc
                .timestamp_opt(1_600_000_000, 123_456_789)
                .single()
                .unwrap(),
        }
    }

    #[test]
    fn test_serialize_exact_shape() {
        let serializer = EventSerializer::new(&[("host".to_string(), "node-1".to_string())]);
        assert_eq!(
            serializer.serialize(&oom_event()),
            r#"{"host":"node-1","seq":1234,"facility":"kern","severity":"info","message":"Out of memory: Kill process 1234","timestamp":"2020-09-13T12:26:40.123456789Z","metadata":["SUBSYSTEM=vmalloc"]}"#
        );
    }

    #[test]
    fn test_serialize_without_labels_or_metadata() {
        let mut event = oom_event();
        event.labels.clear();
        let payload = EventSerializer::new(&[]).serialize(&event);
        assert!(payload.starts_with(r#"{"seq":1234,"#));
        assert!(!payload.contains("metadata"));
        assert!(payload.ends_with(r#""timestamp":"2020-09-13T12:26:40.123456789Z"}"#));
    }

    #[test]
    fn test_timestamp_fraction_is_trimmed() {
        let at = |nanos| Utc.timestamp_opt(1_600_000_000, nanos).single().unwrap();
        assert_eq!(rfc3339_nano(&at(120_000_000)), "2020-09-13T12:26:40.12Z");
        assert_eq!(rfc3339_nano(&at(1_000)), "2020-09-13T12:26:40.000001Z");
        assert_eq!(rfc3339_nano(&at(0)), "2020-09-13T12:26:40Z");

        let mut event = oom_event();
        event.read_timestamp = at(500_000_000);
        let payload = EventSerializer::new(&[]).serialize(&event);
        assert!(payload.ends_with(r#""timestamp":"2020-09-13T12:26:40.5Z","metadata":["SUBSYSTEM=vmalloc"]}"#));
    }

    #[test]
    fn test_static_labels_keep_order() {
        let serializer = EventSerializer::new(&[
            ("zone".to_string(), "b".to_string()),
            ("hostname".to_string(), "10-12-8-1".to_string()),
            ("kernel_version".to_string(), "5.8.12".to_string()),
        ]);
        let payload = serializer.serialize(&oom_event());
        assert!(payload.starts_with(
            r#"{"zone":"b","hostname":"10-12-8-1","kernel_version":"5.8.12","seq":"#
        ));
    }

    #[test]
    fn test_message_quotes_are_escaped() {
        let mut event = oom_event();
        event.message = r#"mount "/data" failed \ retry"#.to_string();
        let payload = EventSerializer::new(&[]).serialize(&event);
        assert!(payload.contains(r#""message":"mount \"/data\" failed \\ retry""#));

        let parsed: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["message"], event.message.as_str());
    }

    #[test]
    fn test_payload_is_valid_json() {
        let serializer = EventSerializer::new(&[("host".to_string(), "node-1".to_string())]);
        let parsed: Value = serde_json::from_str(&serializer.serialize(&oom_event())).unwrap();
        assert_eq!(parsed["host"], "node-1");
        assert_eq!(parsed["seq"], 1234);
        assert_eq!(parsed["facility"], "kern");
        assert_eq!(parsed["severity"], "info");
        assert_eq!(parsed["metadata"][0], "SUBSYSTEM=vmalloc");
        assert!(parsed["timestamp"].is_string());
    }
}
