use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use loadwise::{DispatcherConfig, OverflowPolicy};

/// Runtime configuration for the `loadwise-demo` binary.
///
/// Every value is parsed from a CLI argument or the matching environment
/// variable. The defaults reproduce the classic load-balancer demo: five
/// workers squaring ten thousand numbers with sub-millisecond random work.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "loadwise-demo",
    version,
    about = "Feeds a least-loaded dispatcher with randomized jobs and reports pool load"
)]
pub struct CliArgs {
    /// Number of workers in the pool.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 5)]
    pub num_workers: usize,

    /// Number of jobs to submit. Job `i` computes `i * i`.
    ///
    /// Environment variable: `NUM_JOBS`
    #[arg(long, env = "NUM_JOBS", default_value_t = 10_000)]
    pub num_jobs: usize,

    /// Jobs each worker may buffer before the dispatcher has to wait.
    ///
    /// Environment variable: `WORKER_QUEUE_CAPACITY`
    #[arg(long, env = "WORKER_QUEUE_CAPACITY", default_value_t = 100)]
    pub worker_queue_capacity: usize,

    /// Requests buffered between the producer and the dispatcher.
    ///
    /// Environment variable: `INBOUND_CAPACITY`
    #[arg(long, env = "INBOUND_CAPACITY", default_value_t = 100)]
    pub inbound_capacity: usize,

    /// Upper bound, in microseconds, of the random sleep inside each job.
    ///
    /// Environment variable: `MAX_JOB_DELAY_US`
    #[arg(long, env = "MAX_JOB_DELAY_US", default_value_t = 500)]
    pub max_job_delay_us: u64,

    /// Upper bound, in microseconds, of the random pause between submissions.
    ///
    /// Environment variable: `MAX_SUBMIT_DELAY_US`
    #[arg(long, env = "MAX_SUBMIT_DELAY_US", default_value_t = 50)]
    pub max_submit_delay_us: u64,

    /// Seconds allowed for draining on shutdown before tasks are aborted.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 3)]
    pub shutdown_timeout_secs: u64,

    /// Interval, in milliseconds, between pool load reports.
    ///
    /// Environment variable: `REPORT_INTERVAL_MS`
    #[arg(long, env = "REPORT_INTERVAL_MS", default_value_t = 250)]
    pub report_interval_ms: u64,

    /// Print every result to stdout as it arrives.
    ///
    /// Environment variable: `PRINT_RESULTS`
    #[arg(long, env = "PRINT_RESULTS", default_value_t = false)]
    pub print_results: bool,
}

#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub dispatcher: DispatcherConfig,
    pub num_jobs: usize,
    pub max_job_delay: Duration,
    pub max_submit_delay: Duration,
    pub report_interval: Duration,
    pub print_results: bool,
}

impl TryFrom<CliArgs> for DemoConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_jobs == 0 {
            bail!("NUM_JOBS must be greater than 0");
        }

        // Squares are computed in u64.
        if u32::try_from(args.num_jobs).is_err() {
            bail!(
                "NUM_JOBS ({}) exceeds the supported maximum ({})",
                args.num_jobs,
                u32::MAX
            );
        }

        if args.report_interval_ms == 0 {
            bail!("REPORT_INTERVAL_MS must be greater than 0");
        }

        let dispatcher = DispatcherConfig {
            pool_size: args.num_workers,
            worker_queue_capacity: args.worker_queue_capacity,
            inbound_capacity: args.inbound_capacity,
            overflow: OverflowPolicy::Block,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
        };
        dispatcher.validate()?;

        Ok(Self {
            dispatcher,
            num_jobs: args.num_jobs,
            max_job_delay: Duration::from_micros(args.max_job_delay_us),
            max_submit_delay: Duration::from_micros(args.max_submit_delay_us),
            report_interval: Duration::from_millis(args.report_interval_ms),
            print_results: args.print_results,
        })
    }
}
