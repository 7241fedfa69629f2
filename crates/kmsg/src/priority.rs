// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Syslog facility and severity names.
//!
//! A kernel record prefix packs both values into a single priority number:
//! `priority = facility * 8 + severity` (RFC 5424, section 6.2.1).

/// Facility names indexed by `priority / 8`.
pub const FACILITIES: [&str; 24] = [
    "kern",
    "user",
    "mail",
    "daemon",
    "auth",
    "syslog",
    "lpr",
    "news",
    "uucp",
    "cron",
    "authpriv",
    "ftp",
    "ntp",
    "security",
    "console",
    "solaris-cron",
    "local0",
    "local1",
    "local2",
    "local3",
    "local4",
    "local5",
    "local6",
    "local7",
];

/// Severity names indexed by `priority % 8`.
pub const SEVERITIES: [&str; 8] = [
    "emerg", "alert", "crit", "err", "warning", "notice", "info", "debug",
];

/// Facility name reported when `priority / 8` falls outside [`FACILITIES`].
pub const INVALID_FACILITY: &str = "<invalid>";

/// Returns the severity name for a priority. Always succeeds.
#[must_use]
pub fn severity(priority: u64) -> &'static str {
    SEVERITIES[(priority & 0x7) as usize]
}

/// Returns the facility name for a priority, or [`INVALID_FACILITY`].
#[must_use]
pub fn facility(priority: u64) -> &'static str {
    usize::try_from(priority / 8)
        .ok()
        .and_then(|index| FACILITIES.get(index))
        .copied()
        .unwrap_or(INVALID_FACILITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kern_info() {
        assert_eq!(facility(6), "kern");
        assert_eq!(severity(6), "info");
    }

    #[test]
    fn test_last_valid_facility() {
        // local7.debug
        assert_eq!(facility(191), "local7");
        assert_eq!(severity(191), "debug");
    }

    #[test]
    fn test_facility_out_of_range() {
        assert_eq!(facility(192), INVALID_FACILITY);
        assert_eq!(severity(192), "emerg");
        assert_eq!(facility(u64::from(u32::MAX)), INVALID_FACILITY);
        assert_eq!(facility(u64::MAX), INVALID_FACILITY);
        assert_eq!(severity(u64::MAX), "debug");
    }
}
