// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Node name lookup for the default partition key.

use tracing::warn;

/// Returns this host's node name.
///
/// Tries, in order:
/// 1. `uname(2)` node name
/// 2. `gethostname(2)`
/// 3. `"unknown"`
#[must_use]
pub fn node_name() -> String {
    match nix::sys::utsname::uname() {
        Ok(uts) => {
            if let Some(name) = uts.nodename().to_str() {
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }
        Err(e) => warn!("Failed to read node name from uname: {}", e),
    }

    match nix::unistd::gethostname() {
        Ok(hostname) => {
            if let Some(name) = hostname.to_str() {
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }
        Err(e) => warn!("Failed to get system hostname: {}", e),
    }

    warn!("Could not determine node name, using 'unknown'");
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_name_not_empty() {
        assert!(!node_name().is_empty());
    }

    #[test]
    fn test_node_name_is_stable() {
        assert_eq!(node_name(), node_name());
    }
}
