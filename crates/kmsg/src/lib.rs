// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reader and decoder for the kernel's structured log device (`/dev/kmsg`).
//!
//! Each `read(2)` on the device returns exactly one record shaped as
//!
//! ```text
//! <priority>,<sequence>,<timestamp>,<flags>[,...];<message>\n[<label>\n...]
//! ```
//!
//! [`record::decode`] turns such a record into a [`record::ParsedEvent`], resolving the
//! syslog facility/severity names through [`priority`] and unescaping the message text
//! through [`escape`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod device;
pub mod errors;
pub mod escape;
pub mod priority;
pub mod record;

pub use errors::DecodeError;
pub use record::{decode, ParsedEvent};
