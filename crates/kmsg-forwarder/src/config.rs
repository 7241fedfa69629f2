// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use rand::Rng;

use crate::error::ForwarderError;
use crate::hostname;

pub const DEFAULT_TOPIC: &str = "kernel";
pub const DEFAULT_LATENCY_TARGET: Duration = Duration::from_millis(100);
const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Command line of the forwarder. Every flag can also be set through its environment
/// variable.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "kmsg-forwarder",
    about = "Forward the kernel log to a Kafka topic, one partition per host"
)]
pub struct Cli {
    /// The kafka broker(s) to connect to, comma separated
    #[arg(long = "kafka.broker", env = "KMSG_KAFKA_BROKER", default_value = "")]
    pub broker: String,

    /// The kafka topic
    #[arg(long = "kafka.topic", env = "KMSG_KAFKA_TOPIC", default_value = DEFAULT_TOPIC)]
    pub topic: String,

    /// The kafka client id, must be unique per producer. Defaults to kernel + random
    #[arg(long = "kafka.clientId", env = "KMSG_KAFKA_CLIENT_ID")]
    pub client_id: Option<String>,

    /// The key to determine the partition where all kernel logs should go. Defaults to the
    /// node name
    #[arg(long = "kafka.partitionKey", env = "KMSG_KAFKA_PARTITION_KEY")]
    pub partition_key: Option<String>,

    /// Latency target for message batching, e.g. 100ms
    #[arg(long = "kafka.latency", env = "KMSG_KAFKA_LATENCY", default_value = "100ms")]
    pub latency: String,

    /// Extra labels to put into the json message payload, e.g.
    /// hostname=10-12-8-1,kernel_version=5.8.12
    #[arg(long = "labels", env = "KMSG_LABELS", default_value = "")]
    pub labels: String,

    /// Duplicate messages to stdout
    #[arg(long = "stdout", env = "KMSG_STDOUT")]
    pub stdout: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level", env = "KMSG_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Kernel log device to read from
    #[arg(long = "device", env = "KMSG_DEVICE", default_value = kmsg::device::DEFAULT_DEVICE_PATH)]
    pub device: PathBuf,
}

/// Settings for one run of the forwarder. Read-only once the pipeline starts.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub client_id: String,
    /// Explicit partition key; the node name is used when unset.
    pub partition_key: Option<String>,
    pub latency_target: Duration,
    /// Static labels merged into every payload, in the order given.
    pub labels: Vec<(String, String)>,
    pub stdout: bool,
    pub log_level: String,
    pub device_path: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            topic: DEFAULT_TOPIC.to_string(),
            client_id: default_client_id(),
            partition_key: None,
            latency_target: DEFAULT_LATENCY_TARGET,
            labels: Vec::new(),
            stdout: false,
            log_level: "info".to_string(),
            device_path: PathBuf::from(kmsg::device::DEFAULT_DEVICE_PATH),
        }
    }
}

impl TryFrom<Cli> for RunConfig {
    type Error = ForwarderError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let config = Self {
            brokers: parse_brokers(&cli.broker),
            topic: cli.topic.trim().to_string(),
            client_id: cli
                .client_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(default_client_id),
            partition_key: cli.partition_key.filter(|key| !key.is_empty()),
            latency_target: parse_duration(&cli.latency)?,
            labels: parse_labels(&cli.labels)?,
            stdout: cli.stdout,
            log_level: cli.log_level.to_lowercase(),
            device_path: cli.device,
        };

        config.validate()?;
        Ok(config)
    }
}

impl RunConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ForwarderError> {
        if self.brokers.is_empty() {
            return Err(ForwarderError::Config(
                "--kafka.broker is required".to_string(),
            ));
        }

        if self.topic.is_empty() {
            return Err(ForwarderError::Config(
                "--kafka.topic cannot be empty".to_string(),
            ));
        }

        if self.latency_target.is_zero() {
            return Err(ForwarderError::Config(
                "--kafka.latency must be greater than 0".to_string(),
            ));
        }

        if let Some((_, value)) = self.labels.iter().find(|(key, _)| key.is_empty()) {
            return Err(ForwarderError::Config(format!(
                "label with value '{value}' has an empty key"
            )));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ForwarderError::Config(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// The key all messages of this process are partitioned by.
    #[must_use]
    pub fn partition_key(&self) -> String {
        self.partition_key
            .clone()
            .unwrap_or_else(hostname::node_name)
    }
}

/// `kernel` followed by a random number in `[100000, 999999]`.
#[must_use]
pub fn default_client_id() -> String {
    format!("kernel{}", rand::thread_rng().gen_range(100_000..1_000_000))
}

/// Splits a comma separated broker list, dropping blank entries.
#[must_use]
pub fn parse_brokers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|broker| !broker.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parses `key=value` pairs separated by commas.
///
/// Empty entries are skipped. A repeated key keeps its first position and its last value.
pub fn parse_labels(raw: &str) -> Result<Vec<(String, String)>, ForwarderError> {
    let mut labels: Vec<(String, String)> = Vec::new();
    for label in raw.split(',') {
        if label.is_empty() {
            continue;
        }
        let Some((key, value)) = label.split_once('=') else {
            return Err(ForwarderError::Config(format!(
                "invalid key/value pair: {label}"
            )));
        };
        match labels.iter_mut().find(|(existing, _)| existing == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => labels.push((key.to_string(), value.to_string())),
        }
    }
    Ok(labels)
}

/// Parses durations such as `100ms`, `2s`, `1m` or `500us`. A bare number is taken as
/// milliseconds.
pub fn parse_duration(raw: &str) -> Result<Duration, ForwarderError> {
    let trimmed = raw.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let invalid = || ForwarderError::Config(format!("invalid duration '{raw}'"));
    let value = number.parse::<u64>().map_err(|_| invalid())?;
    match unit {
        "" | "ms" => Ok(Duration::from_millis(value)),
        "us" | "µs" => Ok(Duration::from_micros(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => value
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}
