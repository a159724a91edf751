//! seqring demo
//!
//! Without a subcommand, runs a two-stage pipeline (`sum`, then `count` after
//! it) fed by one or more producer threads, and logs the resulting throughput.
//! `seqring persisted put|get` drives the file-backed queue, so a publisher
//! and a consumer can run as separate processes over the same files.

use anyhow::Context;
use clap::{Parser, Subcommand};
use seqring::disruptor::{
    ClosureEventHandler, DisruptorBuilder, DisruptorConfig, ProducerType, WaitStrategyKind,
};
use seqring::persisted::{PersistedError, PersistedRingBuffer, DEFAULT_ITEM_SIZE, DEFAULT_SIZE};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "seqring")]
#[command(about = "Sequence-gated ring buffer throughput demo")]
#[command(version)]
pub struct Args {
    /// Ring buffer capacity (must be a power of 2)
    #[arg(short, long)]
    pub capacity: Option<usize>,

    /// Number of producer threads
    #[arg(short, long, default_value = "1")]
    pub producers: usize,

    /// Events published by each producer
    #[arg(short, long, default_value = "1000000")]
    pub events: u64,

    /// Wait strategy: busy-spin, yielding, sleeping or blocking
    #[arg(short, long)]
    pub wait_strategy: Option<WaitStrategyKind>,

    /// JSON configuration file; command line flags take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Use the file-backed queue
    Persisted {
        /// Slot file
        #[arg(long, value_name = "FILE", default_value = "seqring.slots")]
        slots: PathBuf,

        /// Index record file
        #[arg(long, value_name = "FILE", default_value = "seqring.index")]
        index: PathBuf,

        /// Number of slots; one is always kept empty
        #[arg(long, default_value_t = DEFAULT_SIZE)]
        size: usize,

        /// Slot width in bytes
        #[arg(long, default_value_t = DEFAULT_ITEM_SIZE)]
        item_size: usize,

        #[command(subcommand)]
        action: PersistedAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum PersistedAction {
    /// Append items in order
    Put {
        #[arg(required = true)]
        items: Vec<String>,

        /// Retry while the queue is full instead of failing
        #[arg(long)]
        wait: bool,
    },
    /// Remove items and print one per line
    Get {
        /// Maximum number of items to remove
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// Wait for items instead of stopping when the queue is empty
        #[arg(long)]
        wait: bool,
    },
}

#[derive(Debug, Default, Clone, Copy)]
struct Tick {
    producer: u64,
    value: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    match &args.command {
        Some(Command::Persisted {
            slots,
            index,
            size,
            item_size,
            action,
        }) => {
            let buffer = PersistedRingBuffer::open_with(slots, index, *size, *item_size)
                .with_context(|| format!("failed to open {}", slots.display()))?;
            run_persisted(&buffer, action)
        }
        None => run_pipeline(&args),
    }
}

fn run_persisted(buffer: &PersistedRingBuffer, action: &PersistedAction) -> anyhow::Result<()> {
    match action {
        PersistedAction::Put { items, wait } => {
            for item in items {
                loop {
                    match buffer.put(item) {
                        Ok(()) => break,
                        Err(PersistedError::Full) if *wait => thread::sleep(POLL_INTERVAL),
                        Err(e) => return Err(e).with_context(|| format!("failed to put {item:?}")),
                    }
                }
                info!(item = %item, "Published");
            }
        }
        PersistedAction::Get { count, wait } => {
            let mut taken = 0;
            while taken < *count {
                match buffer.get() {
                    Ok(item) => {
                        println!("{item}");
                        taken += 1;
                    }
                    Err(PersistedError::Empty) if *wait => thread::sleep(POLL_INTERVAL),
                    Err(PersistedError::Empty) => break,
                    Err(e) => return Err(e.into()),
                }
            }
            info!(items = taken, remaining = buffer.len()?, "Consumed");
        }
    }
    Ok(())
}

fn run_pipeline(args: &Args) -> anyhow::Result<()> {
    let config = load_config(args)?;
    info!("Configuration: {config:?}");

    let sum = Arc::new(AtomicU64::new(0));
    let count = Arc::new(AtomicU64::new(0));
    let sum_sink = Arc::clone(&sum);
    let count_sink = Arc::clone(&count);

    let mut disruptor = DisruptorBuilder::from_config(&config, Tick::default)
        .handle_events_with(
            "sum",
            ClosureEventHandler::new(move |tick: &Tick, _, _| {
                sum_sink.fetch_add(tick.value, Ordering::Relaxed);
                Ok(())
            }),
        )
        .handle_events_after(
            "count",
            ClosureEventHandler::new(move |_: &Tick, _, _| {
                count_sink.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }),
            &["sum"],
        )
        .build()
        .context("failed to build disruptor")?;

    disruptor.start()?;
    let started = Instant::now();

    if config.producer_type.is_single() {
        for value in 0..args.events {
            disruptor.publish(|tick, _| {
                tick.producer = 0;
                tick.value = value;
            })?;
        }
    } else {
        let mut workers = Vec::with_capacity(args.producers);
        for producer_id in 0..args.producers as u64 {
            let mut producer = disruptor.create_producer()?;
            let events = args.events;
            workers.push(thread::spawn(move || -> seqring::Result<()> {
                for value in 0..events {
                    producer.publish(|tick, _| {
                        tick.producer = producer_id;
                        tick.value = value;
                    })?;
                }
                Ok(())
            }));
        }
        for worker in workers {
            worker
                .join()
                .map_err(|_| anyhow::anyhow!("producer thread panicked"))??;
        }
    }

    disruptor.shutdown(true)?;
    let elapsed = started.elapsed();

    let total = count.load(Ordering::Relaxed);
    let expected = args.events * args.producers as u64;
    anyhow::ensure!(
        total == expected,
        "consumed {total} events but published {expected}"
    );

    info!(
        events = total,
        sum = sum.load(Ordering::Relaxed),
        elapsed_ms = elapsed.as_millis() as u64,
        "Throughput: {:.0} events/s",
        total as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    Ok(())
}

/// Merge the configuration file, if any, with the command line
fn load_config(args: &Args) -> anyhow::Result<DisruptorConfig> {
    let mut config = match &args.config {
        Some(path) => DisruptorConfig::from_json_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => DisruptorConfig::default(),
    };

    if let Some(capacity) = args.capacity {
        config.capacity = capacity;
    }
    if let Some(wait_strategy) = args.wait_strategy {
        config.wait_strategy = wait_strategy;
    }
    anyhow::ensure!(args.producers > 0, "at least one producer is required");
    config.producer_type = if args.producers > 1 {
        ProducerType::Multi
    } else {
        ProducerType::Single
    };

    config.validate()?;
    Ok(config)
}

/// Initialize logging based on the specified level
fn init_logging(level: &str) {
    let filter = match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_persisted_put_then_get() {
        let dir = std::env::temp_dir();
        let id = uuid::Uuid::new_v4();
        let slots = dir.join(format!("seqring-cli-{id}.slots"));
        let index = dir.join(format!("seqring-cli-{id}.index"));
        let base = [
            "seqring",
            "persisted",
            "--slots",
            slots.to_str().unwrap(),
            "--index",
            index.to_str().unwrap(),
            "--size",
            "4",
        ];

        let run = |extra: &[&str]| {
            let args = Args::try_parse_from(base.iter().chain(extra)).unwrap();
            let Some(Command::Persisted {
                slots,
                index,
                size,
                item_size,
                action,
            }) = args.command
            else {
                panic!("expected the persisted subcommand");
            };
            let buffer = PersistedRingBuffer::open_with(slots, index, size, item_size).unwrap();
            run_persisted(&buffer, &action).map(|()| buffer.len().unwrap())
        };

        assert_eq!(run(&["put", "Message 1", "Message 2"]).unwrap(), 2);
        assert!(run(&["put", "Message 3", "Message 4"]).is_err());
        assert_eq!(run(&["get", "-n", "10"]).unwrap(), 0);

        let _ = std::fs::remove_file(&slots);
        let _ = std::fs::remove_file(&index);
    }
}
