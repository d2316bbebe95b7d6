use std::convert::TryFrom;
use tokio::time::Duration;

/// Tuning knobs for a node. Anything left as `None` falls back to a default.
#[derive(Clone, Debug, Default)]
pub struct CoordinateOptions {
    pub lease_duration: Option<Duration>,
    /// How long before lease expiry the leader renews. Leader heartbeat interval is
    /// `lease_duration - renew_lease_grace`.
    pub renew_lease_grace: Option<Duration>,
    pub check_lease_interval: Option<Duration>,
    pub check_lease_jitter: Option<Duration>,
    pub message_ack_timeout: Option<Duration>,
    pub message_retry_backoff: Option<Duration>,
    /// Retries after the first attempt.
    pub message_retries: Option<u32>,
    pub request_timeout: Option<Duration>,
    pub websocket_open_timeout: Option<Duration>,
    pub websocket_event_capacity: Option<usize>,
}

#[derive(Clone, Debug)]
pub(crate) struct CoordinateOptionsValidated {
    pub lease_duration: Duration,
    pub renew_lease_grace: Duration,
    pub check_lease_interval: Duration,
    pub check_lease_jitter: Duration,
    pub message_ack_timeout: Duration,
    pub message_retry_backoff: Duration,
    pub message_retries: u32,
    pub request_timeout: Duration,
    pub websocket_open_timeout: Duration,
    pub websocket_event_capacity: usize,
}

impl CoordinateOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.renew_lease_grace >= self.lease_duration {
            return Err("Renew lease grace must be less than the lease duration");
        }
        if self.check_lease_interval.is_zero() {
            return Err("Check lease interval must be non-zero");
        }
        if self.message_ack_timeout.is_zero() {
            return Err("Message ack timeout must be non-zero");
        }
        if self.websocket_event_capacity == 0 {
            return Err("WebSocket event capacity must be non-zero");
        }
        if self.request_timeout <= self.message_ack_timeout {
            return Err("Request timeout must be greater than the message ack timeout");
        }

        Ok(())
    }

    pub fn leader_heartbeat_interval(&self) -> Duration {
        self.lease_duration - self.renew_lease_grace
    }
}

impl TryFrom<CoordinateOptions> for CoordinateOptionsValidated {
    type Error = &'static str;

    fn try_from(options: CoordinateOptions) -> Result<Self, Self::Error> {
        let ms = Duration::from_millis;
        let values = CoordinateOptionsValidated {
            lease_duration: options.lease_duration.unwrap_or(ms(3000)),
            renew_lease_grace: options.renew_lease_grace.unwrap_or(ms(1500)),
            check_lease_interval: options.check_lease_interval.unwrap_or(ms(1000)),
            check_lease_jitter: options.check_lease_jitter.unwrap_or(ms(500)),
            message_ack_timeout: options.message_ack_timeout.unwrap_or(ms(1000)),
            message_retry_backoff: options.message_retry_backoff.unwrap_or(ms(1000)),
            message_retries: options.message_retries.unwrap_or(5),
            request_timeout: options.request_timeout.unwrap_or(Duration::from_secs(30)),
            websocket_open_timeout: options
                .websocket_open_timeout
                .unwrap_or(Duration::from_secs(5)),
            websocket_event_capacity: options.websocket_event_capacity.unwrap_or(1024),
        };

        values.validate()?;
        Ok(values)
    }
}
