//! Bounded worker pool that hands deliveries to the notification sender.
//!
//! Every job carries a pending [`Delivery`]; the worker moves it to exactly
//! one terminal status and reports that status through the job's ticket.

use std::sync::Arc;

use chrono::Utc;
use fleetwatch_core::error::FleetResult;
use fleetwatch_core::models::delivery::{Delivery, DeliveryStatus};
use fleetwatch_core::models::recipient::Channel;
use fleetwatch_core::repository::DeliveryRepository;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{AlertConfig, QueuePolicy};
use crate::error::AlertError;
use crate::sender::NotificationSender;

/// Resolves to the status the worker recorded. A dropped ticket means
/// the worker stopped before finishing the job.
pub type DeliveryTicket = oneshot::Receiver<DeliveryStatus>;

/// What [`Dispatcher::dispatch`] did with a delivery.
#[derive(Debug)]
pub enum Dispatched {
    Queued(DeliveryTicket),
    /// Recorded skipped without reaching the sender.
    Skipped,
    /// Would have been skipped, but another pass already settled it.
    AlreadyTerminal,
}

struct Job {
    delivery: Delivery,
    done: oneshot::Sender<DeliveryStatus>,
}

pub struct Dispatcher<D, S>
where
    D: DeliveryRepository + Clone + 'static,
    S: NotificationSender,
{
    deliveries: D,
    sender: Arc<S>,
    policy: QueuePolicy,
    disabled: Vec<Channel>,
    queue: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl<D, S> Dispatcher<D, S>
where
    D: DeliveryRepository + Clone + 'static,
    S: NotificationSender,
{
    /// Spawn `config.worker_count` workers on the current runtime.
    pub fn new(deliveries: D, sender: S, config: &AlertConfig) -> Self {
        let (queue, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let sender = Arc::new(sender);
        let timeout = config.send_timeout();

        let workers = (0..config.worker_count.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    receiver.clone(),
                    deliveries.clone(),
                    sender.clone(),
                    timeout,
                ))
            })
            .collect();

        Self {
            deliveries,
            sender,
            policy: config.queue_policy,
            disabled: config.disabled_channels.clone(),
            queue,
            workers,
        }
    }

    /// Queue a pending delivery for sending.
    ///
    /// Deliveries on disabled or unsupported channels are recorded skipped
    /// immediately, or reported [`Dispatched::AlreadyTerminal`] when the
    /// stored row has settled in the meantime. Under [`QueuePolicy::RejectNew`] a full queue returns
    /// [`AlertError::QueueFull`] and the delivery stays pending.
    pub async fn dispatch(&self, delivery: Delivery) -> FleetResult<Dispatched> {
        if let Some(reason) = self.skip_reason(delivery.channel) {
            if self.deliveries.mark_skipped(delivery.id, reason.into()).await? {
                return Ok(Dispatched::Skipped);
            }
            debug!(delivery_id = %delivery.id, "Delivery already terminal");
            return Ok(Dispatched::AlreadyTerminal);
        }

        let (done, ticket) = oneshot::channel();
        let job = Job { delivery, done };
        match self.policy {
            QueuePolicy::Block => self
                .queue
                .send(job)
                .await
                .map_err(|_| AlertError::DispatcherClosed)?,
            QueuePolicy::RejectNew => match self.queue.try_send(job) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(job)) => {
                    warn!(delivery_id = %job.delivery.id, "Dispatch queue full, delivery left pending");
                    return Err(AlertError::QueueFull.into());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Err(AlertError::DispatcherClosed.into());
                }
            },
        }
        Ok(Dispatched::Queued(ticket))
    }

    /// Stop accepting jobs, drain the queue and wait for every worker.
    pub async fn shutdown(self) {
        let Dispatcher { queue, workers, .. } = self;
        drop(queue);
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Dispatch worker panicked");
            }
        }
        info!("Dispatcher stopped");
    }

    fn skip_reason(&self, channel: Channel) -> Option<&'static str> {
        if self.disabled.contains(&channel) {
            Some("channel disabled")
        } else if !self.sender.supports(channel) {
            Some("channel not supported by sender")
        } else {
            None
        }
    }
}

async fn run_worker<D, S>(
    worker: usize,
    queue: Arc<Mutex<mpsc::Receiver<Job>>>,
    deliveries: D,
    sender: Arc<S>,
    timeout: std::time::Duration,
) where
    D: DeliveryRepository,
    S: NotificationSender,
{
    debug!(worker, "Dispatch worker started");
    loop {
        let next = queue.lock().await.recv().await;
        let Some(job) = next else { break };
        let status = deliver(&deliveries, sender.as_ref(), &job.delivery, timeout).await;
        // The processor may have given up waiting; the status is stored.
        let _ = job.done.send(status);
    }
    debug!(worker, "Dispatch worker stopped");
}

/// Send one delivery and record its outcome. Returns `Pending` only when
/// the outcome could not be stored.
async fn deliver<D, S>(
    deliveries: &D,
    sender: &S,
    delivery: &Delivery,
    timeout: std::time::Duration,
) -> DeliveryStatus
where
    D: DeliveryRepository,
    S: NotificationSender,
{
    let attempt = sender.send(
        delivery.channel,
        &delivery.destination,
        &delivery.subject,
        &delivery.message,
    );
    let (status, stored) = match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(())) => (
            DeliveryStatus::Sent,
            deliveries.mark_sent(delivery.id, Utc::now()).await,
        ),
        Ok(Err(e)) => {
            warn!(delivery_id = %delivery.id, channel = %delivery.channel, error = %e, "Send failed");
            (
                DeliveryStatus::Failed,
                deliveries.mark_failed(delivery.id, e.detail).await,
            )
        }
        Err(_) => {
            warn!(delivery_id = %delivery.id, channel = %delivery.channel, "Send timed out");
            (
                DeliveryStatus::Failed,
                deliveries
                    .mark_failed(delivery.id, "send timed out".into())
                    .await,
            )
        }
    };

    match stored {
        Ok(true) => {
            debug!(delivery_id = %delivery.id, ?status, "Delivery recorded");
            status
        }
        Ok(false) => {
            debug!(delivery_id = %delivery.id, "Delivery already terminal");
            status
        }
        Err(e) => {
            warn!(delivery_id = %delivery.id, error = %e, "Failed to record delivery outcome");
            DeliveryStatus::Pending
        }
    }
}
