// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use kmsg::device::DeviceError;
use kmsg::DecodeError;

use crate::producer::DeliveryFailure;

/// Fatal conditions of the forwarder.
///
/// None of these are retried: the pipeline stops on the first one and the process exits,
/// leaving restarts to the service manager. Records read but not yet acknowledged are lost.
#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Kernel log device: {0}")]
    Device(#[from] DeviceError),

    #[error("Decoding kernel record: {0}")]
    Decode(#[from] DecodeError),

    #[error("Delivery to broker failed: {0}")]
    Delivery(#[from] DeliveryFailure),

    #[error("Pipeline stage stopped unexpectedly: {0}")]
    Aborted(&'static str),
}

impl ForwarderError {
    /// Short name of the stage that failed, used in the exit diagnostics.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            ForwarderError::Config(_) => "startup",
            ForwarderError::Device(_) => "reader",
            ForwarderError::Decode(_) => "decoder",
            ForwarderError::Delivery(_) => "delivery",
            ForwarderError::Aborted(_) => "pipeline",
        }
    }
}
