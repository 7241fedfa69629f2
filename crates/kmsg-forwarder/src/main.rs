// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use clap::Parser;
use tracing::{error, info};

use kmsg::device::KmsgDevice;
use kmsg_forwarder::{
    config::{Cli, RunConfig},
    logger, partitioner,
    pipeline::DeliveryPipeline,
    producer::KafkaSink,
    ForwarderError,
};

#[tokio::main]
pub async fn main() {
    let cli = Cli::parse();
    logger::init(&cli.log_level);

    if let Err(e) = run(cli).await {
        error!("Shutting down after {} error: {}", e.stage(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), ForwarderError> {
    let config = RunConfig::try_from(cli)?;
    let device = KmsgDevice::open(&config.device_path)?;

    let producer_config = config.clone();
    let (sink, reports, partition_count) =
        tokio::task::spawn_blocking(move || KafkaSink::connect(&producer_config))
            .await
            .map_err(|_| ForwarderError::Aborted("producer setup task failed"))??;

    let partition_key = config.partition_key();
    let partition = partitioner::assign(&partition_key, partition_count)?;
    info!(
        "Kafka brokers: {}, topic: {}, client id: {}",
        config.brokers.join(","),
        config.topic,
        config.client_id
    );
    info!(
        "Partition key {} maps to partition {} of {}",
        partition_key, partition, partition_count
    );

    let mut pipeline = DeliveryPipeline::new(&config, partition, sink, reports);
    match pipeline.run(device).await? {}
}
