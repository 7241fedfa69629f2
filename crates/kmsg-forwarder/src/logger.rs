// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log line formatting and subscriber setup.
//!
//! Lines are prefixed so the forwarder's own diagnostics are easy to tell apart from the
//! kernel records it echoes:
//!
//! ```text
//! KMSG_FORWARDER | INFO | kernel log buffer size: 262144 bytes
//! KMSG_FORWARDER | ERROR | pipeline{partition=3}: Delivery to broker failed: ...
//! ```

use std::fmt;

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

pub const LOG_PREFIX: &str = "KMSG_FORWARDER";

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "{LOG_PREFIX} | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

// rdkafka logs its own messages and librdkafka's through the `log` crate under these targets
const QUIET_TARGETS: &str = "rdkafka=warn,librdkafka=warn";

/// Builds the filter for `log_level`, silencing the Kafka client's chatter below warnings.
#[must_use]
pub fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(format!("{QUIET_TARGETS},{log_level}"))
        .unwrap_or_else(|_| EnvFilter::new(format!("{QUIET_TARGETS},info")))
}

/// Installs the global subscriber and routes `log` records into it. Later calls are ignored.
pub fn init(log_level: &str) {
    let installed = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(log_level))
        .with_ansi(false)
        .event_format(Formatter)
        .try_init();

    if let Err(e) = installed {
        tracing::debug!("Logging already initialized: {}", e);
    }
}
