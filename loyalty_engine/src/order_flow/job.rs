//! A single order under reconciliation, and the loop that polls it to a terminal status.
use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use accrual_client::{AccrualOutcome, AccrualResult, AccrualStatus};
use log::*;
use loyalty_common::OrderNumber;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::{
    accrual::AccrualLookup,
    backoff::BackoffPolicy,
    reconciler::{BalanceReconciler, CreditResult},
    state_machine::transition,
    stats::JobStats,
};
use crate::{db::traits::LoyaltyDatabase, db_types::OrderStatusType};

/// An order and its owner, plus the token that stops the job. Jobs live only in memory.
#[derive(Debug, Clone)]
pub struct Job {
    pub order_number: OrderNumber,
    pub owner: String,
    cancel: CancellationToken,
}

impl Job {
    pub fn new(order_number: OrderNumber, owner: &str, cancel: CancellationToken) -> Self {
        Self { order_number, owner: owner.to_string(), cancel }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Sleeps for `delay`. Returns `false` if the job was cancelled first.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The order reached the given terminal status.
    Completed(OrderStatusType),
    /// The job, or the whole dispatcher, was cancelled.
    Cancelled,
    /// The job watchdog fired before the order settled.
    TimedOut,
    /// Lookups kept failing, or the order no longer exists. The order keeps its last persisted status.
    Abandoned,
    /// The accrual service throttled us more times in a row than the rate-limit policy allows.
    GaveUp,
}

impl Display for JobOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobOutcome::Completed(status) => write!(f, "completed ({status})"),
            JobOutcome::Cancelled => write!(f, "cancelled"),
            JobOutcome::TimedOut => write!(f, "timed out"),
            JobOutcome::Abandoned => write!(f, "abandoned"),
            JobOutcome::GaveUp => write!(f, "gave up"),
        }
    }
}

/// Everything a polling loop needs, shared by all the jobs of one dispatcher.
pub(crate) struct JobContext<A, B> {
    pub accrual: Arc<A>,
    pub reconciler: BalanceReconciler<B>,
    pub rate_limit: BackoffPolicy,
    pub transport: BackoffPolicy,
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    /// Writers hold a read guard. Shutdown takes the write guard, after which no job writes anything.
    pub apply_gate: Arc<RwLock<()>>,
    pub stats: Arc<JobStats>,
}

enum Applied {
    Status(OrderStatusType),
    Failed,
    Vanished,
    Cancelled,
}

/// Runs a job to completion under its watchdog.
pub(crate) async fn run_job<A, B>(job: Job, ctx: Arc<JobContext<A, B>>) -> JobOutcome
where
    A: AccrualLookup,
    B: LoyaltyDatabase,
{
    ctx.stats.job_started();
    let timed_out = Arc::new(AtomicBool::new(false));
    let watchdog = spawn_watchdog(job.cancellation_token(), ctx.job_timeout, Arc::clone(&timed_out));
    let mut outcome = poll_until_settled(&job, &ctx).await;
    // The job is over either way. Cancelling the token releases the watchdog.
    job.cancel();
    let _ = watchdog.await;
    if outcome == JobOutcome::Cancelled && timed_out.load(Ordering::SeqCst) {
        outcome = JobOutcome::TimedOut;
    }
    ctx.stats.job_finished(&outcome);
    match outcome {
        JobOutcome::Completed(_) | JobOutcome::Cancelled => {
            debug!("🔄️ Job for order {} ({}) {outcome}", job.order_number, job.owner)
        },
        _ => warn!("🔄️ Job for order {} ({}) {outcome}", job.order_number, job.owner),
    }
    outcome
}

fn spawn_watchdog(token: CancellationToken, timeout: Duration, fired: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {},
            _ = tokio::time::sleep(timeout) => {
                fired.store(true, Ordering::SeqCst);
                token.cancel();
            },
        }
    })
}

/// Polls the accrual service until the order is terminal or the job is stopped.
pub(crate) async fn poll_until_settled<A, B>(job: &Job, ctx: &JobContext<A, B>) -> JobOutcome
where
    A: AccrualLookup,
    B: LoyaltyDatabase,
{
    let number = &job.order_number;
    let owner = job.owner.as_str();
    let mut status = match ctx.reconciler.db().fetch_order_status(owner, number).await {
        Ok(Some(status)) => status,
        Ok(None) => {
            warn!("🔄️ {owner} has no order {number}. There is nothing to reconcile.");
            return JobOutcome::Abandoned;
        },
        Err(e) => {
            ctx.stats.persistence_error();
            warn!("🔄️ Could not read the status of order {number}, assuming NEW. {e}");
            OrderStatusType::New
        },
    };
    let mut throttled = 0u32;
    let mut failures = 0u32;
    while !status.is_terminal() {
        if job.is_cancelled() {
            return JobOutcome::Cancelled;
        }
        ctx.stats.polled();
        let outcome = ctx.accrual.poll(number).await;
        if job.is_cancelled() {
            debug!("🔄️ Job for order {number} was cancelled during a lookup. The result is discarded.");
            return JobOutcome::Cancelled;
        }
        let result = match outcome {
            AccrualOutcome::RateLimited { retry_after } => {
                ctx.stats.rate_limited();
                throttled += 1;
                if ctx.rate_limit.is_exhausted(throttled) {
                    warn!("🔄️ Still rate limited after {throttled} attempts for order {number}. Giving up.");
                    return JobOutcome::GaveUp;
                }
                let delay = ctx.rate_limit.delay_with_hint(throttled, retry_after);
                trace!("🔄️ Rate limited on order {number}. Retrying in {}ms", delay.as_millis());
                if !job.pause(delay).await {
                    return JobOutcome::Cancelled;
                }
                continue;
            },
            AccrualOutcome::Unregistered => {
                throttled = 0;
                failures = 0;
                trace!("🔄️ The accrual service does not know order {number} yet. It stays {status}.");
                if !job.pause(ctx.poll_interval).await {
                    return JobOutcome::Cancelled;
                }
                continue;
            },
            AccrualOutcome::TransportError(e) => Err(e.to_string()),
            AccrualOutcome::Result(result) => validate(number, result),
        };
        let result = match result {
            Ok(result) => result,
            Err(reason) => {
                ctx.stats.transport_error();
                failures += 1;
                if ctx.transport.is_exhausted(failures) {
                    warn!("🔄️ Lookup for order {number} failed {failures} times in a row. Abandoning. {reason}");
                    job.cancel();
                    return JobOutcome::Abandoned;
                }
                let delay = ctx.transport.delay(failures);
                debug!("🔄️ Lookup for order {number} failed ({reason}). Retrying in {}ms", delay.as_millis());
                if !job.pause(delay).await {
                    return JobOutcome::Cancelled;
                }
                continue;
            },
        };
        throttled = 0;
        failures = 0;
        let next = transition(status, &result);
        if next != status {
            match apply(job, ctx, next, &result).await {
                Applied::Status(persisted) => status = persisted,
                Applied::Failed => ctx.stats.persistence_error(),
                Applied::Vanished => return JobOutcome::Abandoned,
                Applied::Cancelled => return JobOutcome::Cancelled,
            }
        }
        if !status.is_terminal() && !job.pause(ctx.poll_interval).await {
            return JobOutcome::Cancelled;
        }
    }
    JobOutcome::Completed(status)
}

/// Rejects results that cannot be applied as-is: answers about another order, or negative rewards.
fn validate(number: &OrderNumber, result: AccrualResult) -> Result<AccrualResult, String> {
    if result.order != number.as_str() {
        return Err(format!("the accrual service answered for order {}", result.order));
    }
    match result.accrual {
        Some(accrual) if result.status == AccrualStatus::Processed && accrual.is_negative() => {
            Err(format!("the accrual service reported a negative reward of {accrual}"))
        },
        _ => Ok(result),
    }
}

/// Persists the move to `next`. A `PROCESSED` move also credits the owner, in the same transaction.
async fn apply<A, B>(job: &Job, ctx: &JobContext<A, B>, next: OrderStatusType, result: &AccrualResult) -> Applied
where
    A: AccrualLookup,
    B: LoyaltyDatabase,
{
    let _gate = ctx.apply_gate.read().await;
    if job.is_cancelled() {
        return Applied::Cancelled;
    }
    let number = &job.order_number;
    let owner = job.owner.as_str();
    if next == OrderStatusType::Processed {
        let amount = result.accrual.unwrap_or_default();
        match ctx.reconciler.credit(owner, number, amount).await {
            Ok(CreditResult::Credited(_)) => {
                ctx.stats.credited();
                Applied::Status(OrderStatusType::Processed)
            },
            Ok(CreditResult::AlreadySettled) => resync(job, ctx).await,
            Err(e) => {
                warn!("🔄️ Could not settle order {number}. Will try again on the next poll. {e}");
                Applied::Failed
            },
        }
    } else {
        match ctx.reconciler.record_status(owner, number, next).await {
            Ok(true) => {
                debug!("🔄️ Order {number} is now {next}");
                Applied::Status(next)
            },
            Ok(false) => resync(job, ctx).await,
            Err(e) => {
                warn!("🔄️ Could not move order {number} to {next}. Will try again on the next poll. {e}");
                Applied::Failed
            },
        }
    }
}

/// Someone else moved the order on. Adopt whatever is persisted now.
async fn resync<A, B>(job: &Job, ctx: &JobContext<A, B>) -> Applied
where
    A: AccrualLookup,
    B: LoyaltyDatabase,
{
    match ctx.reconciler.db().fetch_order_status(&job.owner, &job.order_number).await {
        Ok(Some(status)) => {
            debug!("🔄️ Order {} was already {status}", job.order_number);
            Applied::Status(status)
        },
        Ok(None) => {
            warn!("🔄️ Order {} disappeared while it was being reconciled", job.order_number);
            Applied::Vanished
        },
        Err(e) => {
            warn!("🔄️ Could not re-read the status of order {}. {e}", job.order_number);
            Applied::Failed
        },
    }
}
