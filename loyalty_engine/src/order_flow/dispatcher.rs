//! The job dispatcher: a bounded queue of jobs, fanned out to at most `max_concurrent_jobs` polling loops.
//!
//! The dispatcher owns a single [`CancellationToken`]. Every job gets a child of it, so [`JobDispatcher::shutdown`]
//! stops the queue, releases blocked submitters and cancels every polling loop in one go.
use std::{
    fmt::Debug,
    sync::{Arc, Mutex},
    time::Duration,
};

use accrual_client::{AccrualApi, AccrualConfig};
use log::*;
use loyalty_common::OrderNumber;
use tokio::{
    sync::{mpsc, mpsc::error::TrySendError, OwnedSemaphorePermit, RwLock, Semaphore},
    task::{JoinHandle, JoinSet},
};
use tokio_util::sync::CancellationToken;

use super::{
    accrual::AccrualLookup,
    backoff::BackoffPolicy,
    errors::DispatchError,
    job::{run_job, Job, JobContext, JobOutcome},
    order_flow_api::OrderFlowApi,
    reconciler::BalanceReconciler,
    stats::{JobStats, JobStatsSnapshot},
};
use crate::db::traits::LoyaltyDatabase;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Capacity of the submission queue. `submit` waits, and `try_submit` fails, when it is full.
    pub queue_size: usize,
    pub max_concurrent_jobs: usize,
    /// A job still running after this long is cancelled by its watchdog.
    pub job_timeout: Duration,
    /// The pause between lookups while the accrual service is still working on an order.
    pub poll_interval: Duration,
    pub rate_limit_backoff: BackoffPolicy,
    pub transport_backoff: BackoffPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_size: 128,
            max_concurrent_jobs: 64,
            job_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(1),
            rate_limit_backoff: BackoffPolicy::default_rate_limit(),
            transport_backoff: BackoffPolicy::default_transport(),
        }
    }
}

/// The submission side of the dispatcher. Cheap to clone; hand one to every order-upload handler.
#[derive(Clone)]
pub struct JobSubmitter {
    sender: mpsc::Sender<Job>,
    shutdown: CancellationToken,
    stats: Arc<JobStats>,
}

impl Debug for JobSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JobSubmitter (capacity {})", self.sender.capacity())
    }
}

impl JobSubmitter {
    /// Queues a job for the order, waiting for room in the queue if necessary.
    ///
    /// Fails with [`DispatchError::JobChannelClosed`] once shutdown has begun, including when shutdown happens
    /// while this call is waiting for room.
    pub async fn submit(&self, order_number: OrderNumber, owner: &str) -> Result<(), DispatchError> {
        if self.shutdown.is_cancelled() {
            return Err(DispatchError::JobChannelClosed);
        }
        let job = Job::new(order_number, owner, self.shutdown.child_token());
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(DispatchError::JobChannelClosed),
            sent = self.sender.send(job) => {
                sent.map_err(|_| DispatchError::JobChannelClosed)?;
                self.stats.job_submitted();
                Ok(())
            },
        }
    }

    /// Queues a job for the order without waiting. Fails with [`DispatchError::QueueFull`] if there is no room.
    pub fn try_submit(&self, order_number: OrderNumber, owner: &str) -> Result<(), DispatchError> {
        if self.shutdown.is_cancelled() {
            return Err(DispatchError::JobChannelClosed);
        }
        let job = Job::new(order_number, owner, self.shutdown.child_token());
        match self.sender.try_send(job) {
            Ok(()) => {
                self.stats.job_submitted();
                Ok(())
            },
            Err(TrySendError::Full(_)) => Err(DispatchError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(DispatchError::JobChannelClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.sender.is_closed()
    }
}

pub struct JobDispatcher<B> {
    config: DispatcherConfig,
    reconciler: BalanceReconciler<B>,
    submitter: JobSubmitter,
    receiver: Arc<Mutex<Option<mpsc::Receiver<Job>>>>,
    shutdown: CancellationToken,
    apply_gate: Arc<RwLock<()>>,
    stats: Arc<JobStats>,
}

impl<B> Clone for JobDispatcher<B> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            reconciler: self.reconciler.clone(),
            submitter: self.submitter.clone(),
            receiver: Arc::clone(&self.receiver),
            shutdown: self.shutdown.clone(),
            apply_gate: Arc::clone(&self.apply_gate),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<B> Debug for JobDispatcher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JobDispatcher ({:?}, {})", self.config, self.stats.snapshot())
    }
}

impl<B> JobDispatcher<B>
where B: LoyaltyDatabase
{
    pub fn new(db: Arc<B>, config: DispatcherConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_size.max(1));
        let shutdown = CancellationToken::new();
        let stats = Arc::new(JobStats::default());
        let submitter = JobSubmitter { sender, shutdown: shutdown.clone(), stats: Arc::clone(&stats) };
        Self {
            config,
            reconciler: BalanceReconciler::new(db),
            submitter,
            receiver: Arc::new(Mutex::new(Some(receiver))),
            shutdown,
            apply_gate: Arc::new(RwLock::new(())),
            stats,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn submitter(&self) -> JobSubmitter {
        self.submitter.clone()
    }

    pub fn reconciler(&self) -> BalanceReconciler<B> {
        self.reconciler.clone()
    }

    pub fn order_flow_api(&self) -> OrderFlowApi<B> {
        OrderFlowApi::new(self.reconciler.clone(), self.submitter.clone())
    }

    pub async fn submit(&self, order_number: OrderNumber, owner: &str) -> Result<(), DispatchError> {
        self.submitter.submit(order_number, owner).await
    }

    pub fn try_submit(&self, order_number: OrderNumber, owner: &str) -> Result<(), DispatchError> {
        self.submitter.try_submit(order_number, owner)
    }

    pub fn stats(&self) -> JobStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Starts the dispatch loop against the accrual service at `accrual_base_url`.
    pub fn run(&self, accrual_base_url: &str) -> Result<JoinHandle<()>, DispatchError> {
        let api = AccrualApi::new(AccrualConfig::new(accrual_base_url))?;
        self.start(Arc::new(api))
    }

    /// Starts the dispatch loop with any accrual source. The loop runs until [`Self::shutdown`] is called, and the
    /// returned handle resolves once every polling loop has exited.
    ///
    /// A dispatcher can only be started once.
    pub fn start<A: AccrualLookup>(&self, accrual: Arc<A>) -> Result<JoinHandle<()>, DispatchError> {
        if self.shutdown.is_cancelled() {
            return Err(DispatchError::JobChannelClosed);
        }
        let receiver = match self.receiver.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let receiver = receiver.ok_or(DispatchError::AlreadyRunning)?;
        let ctx = Arc::new(JobContext {
            accrual,
            reconciler: self.reconciler.clone(),
            rate_limit: self.config.rate_limit_backoff,
            transport: self.config.transport_backoff,
            poll_interval: self.config.poll_interval,
            job_timeout: self.config.job_timeout,
            apply_gate: Arc::clone(&self.apply_gate),
            stats: Arc::clone(&self.stats),
        });
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_jobs.max(1)));
        info!(
            "🚦️ Job dispatcher starting. Queue size: {}, concurrent jobs: {}",
            self.config.queue_size, self.config.max_concurrent_jobs
        );
        Ok(tokio::spawn(dispatch_loop(receiver, ctx, permits, self.shutdown.clone())))
    }

    /// Re-submits every order that has not reached a terminal status. Returns how many jobs were queued.
    ///
    /// Submission waits for queue capacity, so call this after [`Self::start`] if there may be more pending orders
    /// than the queue holds.
    pub async fn resume_pending_orders(&self) -> Result<usize, DispatchError> {
        let pending = self
            .reconciler
            .db()
            .fetch_pending_orders()
            .await
            .map_err(|e| DispatchError::DatabaseError(e.to_string()))?;
        let total = pending.len();
        info!("🚦️ Resuming {total} unfinished orders");
        for order in pending {
            self.submitter.submit(order.number, &order.owner).await?;
        }
        Ok(total)
    }

    /// Stops accepting jobs and cancels every polling loop.
    ///
    /// When this returns, no job will write to the database again. Loops that are mid-lookup finish the lookup and
    /// discard the result. Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("🚦️ Job dispatcher shutting down. {}", self.stats.snapshot());
        }
        self.shutdown.cancel();
        let _gate = self.apply_gate.write().await;
        trace!("🚦️ No jobs are writing any more");
    }
}

async fn dispatch_loop<A, B>(
    mut receiver: mpsc::Receiver<Job>,
    ctx: Arc<JobContext<A, B>>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
) where
    A: AccrualLookup,
    B: LoyaltyDatabase,
{
    let mut jobs = JoinSet::new();
    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(finished) = jobs.join_next(), if !jobs.is_empty() => {
                log_join_result(finished);
                continue;
            },
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        let permit = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                ctx.stats.job_dropped();
                break;
            },
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        trace!("🚦️ Starting job for order {} ({})", job.order_number, job.owner);
        jobs.spawn(run_with_permit(job, Arc::clone(&ctx), permit));
    }
    receiver.close();
    let mut dropped = 0;
    while let Ok(job) = receiver.try_recv() {
        trace!("🚦️ Dropping queued job for order {}", job.order_number);
        ctx.stats.job_dropped();
        dropped += 1;
    }
    debug!("🚦️ Job dispatcher stopped. {dropped} queued jobs dropped, waiting for {} running jobs", jobs.len());
    while let Some(finished) = jobs.join_next().await {
        log_join_result(finished);
    }
    info!("🚦️ All jobs have stopped");
}

async fn run_with_permit<A, B>(job: Job, ctx: Arc<JobContext<A, B>>, _permit: OwnedSemaphorePermit) -> JobOutcome
where
    A: AccrualLookup,
    B: LoyaltyDatabase,
{
    run_job(job, ctx).await
}

fn log_join_result(result: Result<JobOutcome, tokio::task::JoinError>) {
    match result {
        Ok(outcome) => trace!("🚦️ Job finished: {outcome}"),
        Err(e) => error!("🚦️ A job panicked. {e}"),
    }
}
