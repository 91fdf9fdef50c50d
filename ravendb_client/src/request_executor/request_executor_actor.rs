use std::{sync::Weak, time::Duration};

use tokio::{
    sync::mpsc,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::instrument;

use crate::document_conventions::{DocumentConventions, MIN_TIMER_INTERVAL};

use super::{request_executor_handle::RequestExecutorInner, RequestExecutor, RequestExecutorMessage};

/// Background half of a [`RequestExecutor`]: the periodic topology refresh, the speed tests and
/// the work scheduled by response headers.
///
/// The actor only holds a weak reference, so it never keeps a dropped executor alive.
pub(crate) struct RequestExecutorActor {
    executor: Weak<RequestExecutorInner>,
    receiver: mpsc::Receiver<RequestExecutorMessage>,
    topology_refresh_interval: Duration,
    speed_test_interval: Duration,
    topology_updates_enabled: bool,
}

impl RequestExecutorActor {
    pub(crate) fn new(
        receiver: mpsc::Receiver<RequestExecutorMessage>,
        executor: Weak<RequestExecutorInner>,
        conventions: &DocumentConventions,
        topology_updates_enabled: bool,
    ) -> Self {
        Self {
            executor,
            receiver,
            // interval_at panics on a zero period
            topology_refresh_interval: conventions
                .topology_refresh_interval()
                .max(MIN_TIMER_INTERVAL),
            speed_test_interval: conventions.speed_test_interval().max(MIN_TIMER_INTERVAL),
            topology_updates_enabled,
        }
    }

    fn executor(&self) -> Option<RequestExecutor> {
        self.executor.upgrade().map(RequestExecutor::from_inner)
    }

    /// Returns `false` once the executor is gone.
    async fn handle_message(&self, msg: RequestExecutorMessage) -> bool {
        let executor = match self.executor() {
            Some(executor) if !executor.is_disposed() => executor,
            _ => return false,
        };

        match msg {
            RequestExecutorMessage::FirstTopologyUpdate => {
                if let Err(e) = executor.first_topology_update().await {
                    tracing::error!(
                        "An error occurred while running the first topology update. Caused by: {}",
                        e
                    );
                }
            }
            RequestExecutorMessage::UpdateTopology { force_update } => {
                if let Err(e) = executor.refresh_topology(force_update).await {
                    tracing::warn!(
                        "An error occurred while updating the topology. Caused by: {}",
                        e
                    );
                }
            }
            RequestExecutorMessage::UpdateClientConfiguration => {
                if let Err(e) = executor.update_client_configuration().await {
                    tracing::warn!(
                        "An error occurred while updating the client configuration. Caused by: {}",
                        e
                    );
                }
            }
            RequestExecutorMessage::RunSpeedTest => executor.speed_test().await,
        }
        true
    }
}

#[instrument(level = "debug", name = "Running Request Executor Actor", skip(actor))]
pub(crate) async fn run_request_executor_actor(mut actor: RequestExecutorActor) {
    let mut topology_timer = interval_at(
        Instant::now() + actor.topology_refresh_interval,
        actor.topology_refresh_interval,
    );
    topology_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut speed_test_timer = interval_at(
        Instant::now() + actor.speed_test_interval,
        actor.speed_test_interval,
    );
    speed_test_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let timers_enabled = actor.topology_updates_enabled;

    loop {
        let msg = tokio::select! {
            _ = topology_timer.tick(), if timers_enabled => {
                RequestExecutorMessage::UpdateTopology { force_update: false }
            }
            _ = speed_test_timer.tick(), if timers_enabled => RequestExecutorMessage::RunSpeedTest,
            msg = actor.receiver.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        if !actor.handle_message(msg).await {
            break;
        }
    }
    tracing::debug!("Request executor actor stopped");
}
