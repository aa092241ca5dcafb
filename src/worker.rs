//! Optional whole-frame offload onto a small rayon pool.
//!
//! At most one job runs per worker; at most one more per worker waits in a
//! FIFO backlog, and a full backlog drops its oldest job. Building the pool
//! can fail, in which case callers stay on the single-threaded path.

use std::{
    collections::VecDeque,
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    time::Duration,
};

use crate::{
    effects::{EffectContext, EffectOutcome, FrameClock, apply_effect},
    foundation::core::PixelBuffer,
    params::{EffectKind, EffectParameters},
};

/// One frame's worth of work. Each job runs with its own effect context so
/// jobs never share mutable state.
#[derive(Clone, Debug)]
pub struct FrameJob {
    pub id: u64,
    pub buffer: PixelBuffer,
    pub params: EffectParameters,
    /// Frame counter value the effect sees.
    pub frame: u64,
    pub seed: u64,
}

#[derive(Clone, Debug)]
pub struct JobResult {
    pub id: u64,
    pub frame: u64,
    pub effect: EffectKind,
    pub outcome: EffectOutcome,
}

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
    in_flight: usize,
    backlog: VecDeque<FrameJob>,
    tx: Sender<JobResult>,
    rx: Receiver<JobResult>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("in_flight", &self.in_flight)
            .field("backlog", &self.backlog.len())
            .finish()
    }
}

impl WorkerPool {
    /// `min(available cores, max_workers)` workers, or `None` if no pool can be
    /// built.
    pub fn try_new(max_workers: usize) -> Option<Self> {
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
        let workers = cores.min(max_workers);
        if workers == 0 {
            tracing::warn!("worker pool disabled: zero workers requested");
            return None;
        }
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("slitscan-worker-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(error = %e, "worker pool unavailable; rendering on the caller thread");
                return None;
            }
        };
        let (tx, rx) = mpsc::channel();
        tracing::debug!(workers, "worker pool started");
        Some(Self {
            pool,
            workers,
            in_flight: 0,
            backlog: VecDeque::new(),
            tx,
            rx,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight == 0 && self.backlog.is_empty()
    }

    /// Queues `job`. Returns the id of a queued job it displaced, if the
    /// backlog was full.
    pub fn submit(&mut self, job: FrameJob) -> Option<u64> {
        if self.in_flight < self.workers {
            self.spawn(job);
            return None;
        }
        let dropped = if self.backlog.len() >= self.workers {
            self.backlog.pop_front().map(|stale| stale.id)
        } else {
            None
        };
        self.backlog.push_back(job);
        dropped
    }

    fn spawn(&mut self, job: FrameJob) {
        self.in_flight += 1;
        let tx = self.tx.clone();
        self.pool.spawn(move || {
            let mut ctx = EffectContext::seeded(job.seed);
            ctx.clock = FrameClock::new(job.frame);
            let outcome = apply_effect(&job.buffer, &job.params, &mut ctx);
            // receiver gone means the pool was dropped; nothing to report to
            let _ = tx.send(JobResult {
                id: job.id,
                frame: job.frame,
                effect: job.params.effect,
                outcome,
            });
        });
    }

    fn dispatch_backlog(&mut self) {
        while self.in_flight < self.workers {
            let Some(job) = self.backlog.pop_front() else {
                break;
            };
            self.spawn(job);
        }
    }

    /// Collects finished jobs without blocking, ordered by job id.
    pub fn poll(&mut self) -> Vec<JobResult> {
        let mut done = Vec::new();
        while let Ok(result) = self.rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            done.push(result);
        }
        self.dispatch_backlog();
        done.sort_by_key(|r| r.id);
        done
    }

    /// Blocks until every submitted job has finished or `timeout` passes.
    pub fn drain(&mut self, timeout: Duration) -> Vec<JobResult> {
        let mut done = Vec::new();
        while !self.is_idle() {
            match self.rx.recv_timeout(timeout) {
                Ok(result) => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    done.push(result);
                    self.dispatch_backlog();
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        done.sort_by_key(|r| r.id);
        done
    }

    /// Drops queued jobs that have not started yet.
    pub fn clear_backlog(&mut self) -> usize {
        let n = self.backlog.len();
        self.backlog.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{foundation::core::Rgba, params::Direction};

    fn job(id: u64) -> FrameJob {
        FrameJob {
            id,
            buffer: PixelBuffer::filled(8, 8, Rgba::new(id as u8, 0, 0, 255)).unwrap(),
            params: EffectParameters::new(EffectKind::Glitch, 0.0, Direction::Vertical),
            frame: 0,
            seed: id,
        }
    }

    #[test]
    fn backlog_keeps_only_the_newest_jobs() {
        let mut pool = WorkerPool::try_new(1).unwrap();
        assert_eq!(pool.workers(), 1);
        assert_eq!(pool.submit(job(0)), None);
        assert_eq!(pool.submit(job(1)), None);
        for id in 2..50 {
            assert_eq!(pool.submit(job(id)), Some(id - 1));
            assert!(pool.backlog_len() <= pool.workers());
            assert_eq!(pool.in_flight(), 1);
        }

        let done = pool.drain(Duration::from_secs(10));
        let ids = done.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![0, 49]);
        assert!(pool.is_idle());
        assert_eq!(done[1].outcome.buffer.pixel(0, 0).r, 49);
    }

    #[test]
    fn zero_workers_means_no_pool() {
        assert!(WorkerPool::try_new(0).is_none());
    }

    #[test]
    fn same_seed_same_output_as_inline() {
        let mut pool = WorkerPool::try_new(2).unwrap();
        let mut j = job(7);
        j.params = EffectParameters::new(EffectKind::Glitch, 1.0, Direction::Vertical);
        pool.submit(j.clone());
        let done = pool.drain(Duration::from_secs(10));

        let mut ctx = EffectContext::seeded(j.seed);
        let inline = apply_effect(&j.buffer, &j.params, &mut ctx);
        assert_eq!(done[0].outcome, inline);
    }
}
