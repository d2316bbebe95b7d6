use crate::peer::time::{Clock, RealClock};
use std::sync::Weak;
use tokio::time::Duration;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Something that wants to be poked on a role-dependent interval.
#[async_trait::async_trait]
pub(crate) trait HeartbeatTarget: Send + Sync + 'static {
    /// Asked before every sleep, since the role (and so the interval) can change between beats.
    fn next_heartbeat_interval(&self) -> Duration;
    async fn heartbeat(&self);
}

/// Owns the timer task. Dropping the handle stops the task before its next beat.
pub(crate) struct HeartbeatHandle {
    _cancel_on_drop: DropGuard,
}

struct HeartbeatTask<T, C> {
    target: Weak<T>,
    clock: C,
    cancelled: CancellationToken,
}

impl HeartbeatHandle {
    /// The task also stops once `parent` is cancelled.
    pub(crate) fn spawn<T: HeartbeatTarget>(target: Weak<T>, parent: &CancellationToken) -> Self {
        let (task, handle) = HeartbeatTask::new(target, RealClock, parent.child_token());
        tokio::spawn(task.run());

        handle
    }
}

impl<T: HeartbeatTarget, C: Clock> HeartbeatTask<T, C> {
    fn new(target: Weak<T>, clock: C, token: CancellationToken) -> (Self, HeartbeatHandle) {
        let task = HeartbeatTask {
            target,
            clock,
            cancelled: token.clone(),
        };
        let handle = HeartbeatHandle {
            _cancel_on_drop: token.drop_guard(),
        };

        (task, handle)
    }

    async fn run(mut self) {
        loop {
            let interval = match self.target.upgrade() {
                Some(target) => target.next_heartbeat_interval(),
                None => return,
            };

            tokio::select! {
                _ = self.cancelled.cancelled() => return,
                _ = self.clock.sleep(interval) => {}
            }

            // The beat itself is not raced against cancellation. A beat may dispose its own
            // target, which drops this task's handle from inside the call.
            let Some(target) = self.target.upgrade() else {
                return;
            };
            target.heartbeat().await;
            drop(target);

            if self.cancelled.is_cancelled() {
                return;
            }
        }
    }
}
