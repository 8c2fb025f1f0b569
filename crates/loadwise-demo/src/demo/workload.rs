//! The squaring workload.
//!
//! A producer task submits `num_jobs` jobs through a [`Submitter`], pausing a
//! random few microseconds between submissions. Job `i` sleeps a random
//! duration and returns `i * i`. All outcomes share one result channel, which
//! the consumer drains while periodically logging the pool's load.

use super::config::DemoConfig;
use core::time::Duration;
use loadwise::{Dispatcher, Job, JobOutcome, JobRequest, PoolSnapshot, Submitter};
use rand::Rng;
use std::time::Instant;
use tokio::{
    sync::mpsc,
    time::{MissedTickBehavior, interval, sleep},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Square {
    pub input: u64,
    pub result: u64,
}

#[derive(Debug)]
pub struct WorkloadSummary {
    pub submitted: usize,
    pub squares: Vec<Square>,
    pub failed: usize,
    pub elapsed: Duration,
    pub snapshot: PoolSnapshot,
}

impl WorkloadSummary {
    /// Inputs in `0..submitted` with no successful result.
    pub fn missing(&self) -> Vec<u64> {
        let mut seen = vec![false; self.submitted];
        for square in &self.squares {
            if let Some(slot) = usize::try_from(square.input)
                .ok()
                .and_then(|i| seen.get_mut(i))
            {
                *slot = true;
            }
        }
        seen.iter()
            .enumerate()
            .filter(|&(_, &present)| !present)
            .map(|(i, _)| i as u64)
            .collect()
    }

    pub fn log(&self) {
        tracing::info!(
            "Collected {} results ({} failed) in {:?}",
            self.squares.len(),
            self.failed,
            self.elapsed
        );
        for worker in &self.snapshot.workers {
            tracing::info!(
                "{}: ran {} jobs, {} in flight",
                worker.id,
                worker.completed,
                worker.load
            );
        }
        let missing = self.missing();
        if missing.is_empty() {
            tracing::info!("Every submitted job returned exactly one result");
        } else {
            tracing::warn!("{} jobs returned no result", missing.len());
        }
    }
}

/// Runs the workload to completion and returns what was collected.
pub async fn run_workload(
    dispatcher: &Dispatcher<Square>,
    config: &DemoConfig,
) -> anyhow::Result<WorkloadSummary> {
    let start = Instant::now();
    let (tx, mut results) = mpsc::channel(config.dispatcher.inbound_capacity);
    let producer = tokio::spawn(produce(
        dispatcher.submitter(),
        tx,
        config.num_jobs,
        config.max_job_delay,
        config.max_submit_delay,
    ));

    let mut report = interval(config.report_interval);
    report.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut squares = Vec::with_capacity(config.num_jobs);
    let mut failed = 0;
    loop {
        tokio::select! {
            outcome = results.recv() => match outcome {
                Some(Ok(square)) => {
                    if config.print_results {
                        println!("i {}\tresult {}", square.input, square.result);
                    }
                    squares.push(square);
                }
                Some(Err(e)) => {
                    tracing::warn!("Job failed: {e}");
                    failed += 1;
                }
                None => break,
            },
            _ = report.tick() => {
                let snapshot = dispatcher.snapshot().await?;
                tracing::info!(
                    "Pool load {:?} ({} in flight, {} done)",
                    snapshot.loads(),
                    snapshot.total_load(),
                    snapshot.total_completed()
                );
            }
        }
    }

    let submitted = producer.await??;
    let elapsed = start.elapsed();
    let snapshot = dispatcher.snapshot().await?;

    Ok(WorkloadSummary {
        submitted,
        squares,
        failed,
        elapsed,
        snapshot,
    })
}

/// Submits the jobs and returns how many were accepted.
async fn produce(
    submitter: Submitter<Square>,
    tx: mpsc::Sender<JobOutcome<Square>>,
    num_jobs: usize,
    max_job_delay: Duration,
    max_submit_delay: Duration,
) -> loadwise::Result<usize> {
    for input in 0..num_jobs as u64 {
        let delay = random_delay(max_job_delay);
        let job = Job::new(move || async move {
            sleep(delay).await;
            Square {
                input,
                result: input * input,
            }
        });
        submitter.submit(JobRequest::new(job, tx.clone())).await?;

        let pause = random_delay(max_submit_delay);
        if !pause.is_zero() {
            sleep(pause).await;
        }
    }
    tracing::debug!("Producer submitted {num_jobs} jobs");
    Ok(num_jobs)
}

fn random_delay(max: Duration) -> Duration {
    let max_us = u64::try_from(max.as_micros()).unwrap_or(u64::MAX);
    if max_us == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(rand::rng().random_range(0..max_us))
}
