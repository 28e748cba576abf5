//! Encrypted delivery of forwarded messages to the push relay.
//!
//! Each forwarded message is owned end to end by one spawned task:
//! assemble the payload, encrypt it, POST it with bounded retries, then
//! report the outcome through the [`LogSink`] and [`NotificationSink`].
//! Nothing escapes the task; callers only observe side effects (or the
//! join handle, if they keep it).

use crate::cipher::{self, CipherError, EncryptedEnvelope};
use crate::device::DeviceLabelResolver;
use crate::event_log::{LogLevel, LogSink};
use crate::message::{DeliveryPayload, InboundMessage};
use crate::notify::NotificationSink;
use crate::relay::{relay_url, RelayRequest, Transport, TransportError};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle, JoinSet};

/// Hard cap on attempts per message.
pub const MAX_ATTEMPTS: u32 = 3;

/// Seals a plaintext payload with the relay password.
pub type Encryptor = fn(&str, &str) -> Result<EncryptedEnvelope, CipherError>;

/// Relay settings resolved from the secret stores for one delivery.
#[derive(Debug, Clone, Default)]
pub struct DeliveryConfig {
    pub topic: Option<String>,
    pub password: Option<String>,
    pub endpoint_base: String,
}

/// Backoff between attempts: `min(base_delay * attempt, max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to `1..=MAX_ATTEMPTS`.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS),
            base_delay,
            max_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        std::cmp::min(self.base_delay.saturating_mul(attempt), self.max_delay)
    }
}

/// `FatalFailure` marks the attempt that ended delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RetryableFailure(TransportError),
    FatalFailure(TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAttempt {
    pub attempt_number: u32,
    pub outcome: AttemptOutcome,
}

/// Attempts made by a successful delivery, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempts: Vec<DeliveryAttempt>,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("relay topic is not configured")]
    MissingTopic,
    #[error("encryption password is not configured")]
    MissingPassword,
    #[error("invalid relay endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error(transparent)]
    Encryption(#[from] CipherError),
    #[error("delivery failed after {} attempts: {last_error}", .attempts.len())]
    ExhaustedRetries {
        attempts: Vec<DeliveryAttempt>,
        last_error: TransportError,
    },
}

pub type DeliveryOutcome = Result<DeliveryReport, DeliveryError>;

pub struct DeliveryPipeline<T: Transport> {
    transport: T,
    log: Arc<dyn LogSink>,
    notifier: Arc<dyn NotificationSink>,
    device: DeviceLabelResolver,
    retry: RetryPolicy,
    encrypt: Encryptor,
}

impl<T: Transport> DeliveryPipeline<T> {
    pub fn new(
        transport: T,
        log: Arc<dyn LogSink>,
        notifier: Arc<dyn NotificationSink>,
        device: DeviceLabelResolver,
    ) -> Self {
        Self {
            transport,
            log,
            notifier,
            device,
            retry: RetryPolicy::default(),
            encrypt: cipher::encrypt,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_encryptor(mut self, encrypt: Encryptor) -> Self {
        self.encrypt = encrypt;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Hand a message off to its own task and return immediately.
    pub fn dispatch(
        self: &Arc<Self>,
        inbound: InboundMessage,
        display_name: String,
        config: DeliveryConfig,
    ) -> JoinHandle<DeliveryOutcome> {
        tokio::spawn(self.worker(inbound, display_name, config))
    }

    /// The owned delivery future run by a worker task.
    pub fn worker(
        self: &Arc<Self>,
        inbound: InboundMessage,
        display_name: String,
        config: DeliveryConfig,
    ) -> impl Future<Output = DeliveryOutcome> + Send + 'static {
        let pipeline = Arc::clone(self);
        async move { pipeline.deliver(&inbound, &display_name, &config).await }
    }

    pub async fn deliver(
        &self,
        inbound: &InboundMessage,
        display_name: &str,
        config: &DeliveryConfig,
    ) -> Result<DeliveryReport, DeliveryError> {
        let Some(topic) = non_empty(config.topic.as_deref()) else {
            self.log.append(
                LogLevel::Warning,
                "Relay topic not configured, message not forwarded",
                None,
            );
            return Err(DeliveryError::MissingTopic);
        };
        let Some(password) = non_empty(config.password.as_deref()) else {
            self.log.append(
                LogLevel::Warning,
                "Encryption password not configured, message not forwarded",
                None,
            );
            return Err(DeliveryError::MissingPassword);
        };
        let url = match relay_url(&config.endpoint_base, topic) {
            Ok(url) => url,
            Err(reason) => {
                self.log.append(
                    LogLevel::Warning,
                    "Relay endpoint is invalid, message not forwarded",
                    Some(&reason),
                );
                return Err(DeliveryError::InvalidEndpoint {
                    endpoint: config.endpoint_base.clone(),
                    reason,
                });
            }
        };

        let payload = DeliveryPayload::new(
            display_name,
            inbound.body.as_deref(),
            self.device.resolve(),
        );

        // Deterministic for the same inputs, so never retried
        let envelope = match (self.encrypt)(&payload.to_plaintext(), password) {
            Ok(envelope) => envelope.encode(),
            Err(e) => {
                self.log.append(
                    LogLevel::Error,
                    "Failed to encrypt message",
                    Some(&e.to_string()),
                );
                self.notifier.notify(
                    false,
                    "SMS encryption failed",
                    &format!("Could not encrypt message from {}", payload.display_name),
                );
                return Err(e.into());
            }
        };

        let request = RelayRequest {
            url,
            title: payload.title(),
            body: envelope,
        };
        self.send_with_retry(&request, &payload.display_name).await
    }

    async fn send_with_retry(
        &self,
        request: &RelayRequest,
        display_name: &str,
    ) -> Result<DeliveryReport, DeliveryError> {
        let max_attempts = self.retry.max_attempts();
        let mut attempts = Vec::with_capacity(max_attempts as usize);
        let mut attempt_number = 0;

        loop {
            attempt_number += 1;

            match self.transport.post(request).await {
                Ok(()) => {
                    attempts.push(DeliveryAttempt {
                        attempt_number,
                        outcome: AttemptOutcome::Success,
                    });
                    let details = (attempt_number > 1).then(|| format!("attempt {attempt_number}"));
                    self.log.append(
                        LogLevel::Info,
                        &format!("Message from {display_name} forwarded"),
                        details.as_deref(),
                    );
                    self.notifier.notify(
                        true,
                        "SMS forwarded successfully",
                        &format!("Message from {display_name} sent to laptop"),
                    );
                    return Ok(DeliveryReport { attempts });
                }
                Err(e) if attempt_number < max_attempts => {
                    let delay = self.retry.delay_after(attempt_number);
                    self.log.append(
                        LogLevel::Error,
                        &format!("Delivery attempt {attempt_number}/{max_attempts} failed"),
                        Some(&format!("{e}; retrying in {}ms", delay.as_millis())),
                    );
                    attempts.push(DeliveryAttempt {
                        attempt_number,
                        outcome: AttemptOutcome::RetryableFailure(e),
                    });
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    attempts.push(DeliveryAttempt {
                        attempt_number,
                        outcome: AttemptOutcome::FatalFailure(e.clone()),
                    });
                    let summary = attempts
                        .iter()
                        .filter_map(|attempt| match &attempt.outcome {
                            AttemptOutcome::RetryableFailure(err)
                            | AttemptOutcome::FatalFailure(err) => {
                                Some(format!("attempt {}: {err}", attempt.attempt_number))
                            }
                            AttemptOutcome::Success => None,
                        })
                        .collect::<Vec<_>>()
                        .join("; ");
                    self.log.append(
                        LogLevel::Error,
                        &format!(
                            "Failed to forward message from {display_name} after {attempt_number} attempts"
                        ),
                        Some(&summary),
                    );
                    self.notifier.notify(
                        false,
                        "SMS forwarding failed",
                        &format!("Failed to send message from {display_name}"),
                    );
                    return Err(DeliveryError::ExhaustedRetries {
                        attempts,
                        last_error: e,
                    });
                }
            }
        }
    }
}

/// Delivery tasks in flight.
///
/// Finished workers are reaped with [`WorkerSet::reap`] while input is still
/// arriving, so a long-lived stream only holds tasks that are still running.
#[derive(Default)]
pub struct WorkerSet {
    tasks: JoinSet<DeliveryOutcome>,
    delivered: usize,
    failed: usize,
}

impl WorkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, worker: F)
    where
        F: Future<Output = DeliveryOutcome> + Send + 'static,
    {
        self.tasks.spawn(worker);
    }

    /// Number of workers not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Collect every worker that has already finished, without waiting.
    pub fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            self.record(joined);
        }
    }

    /// Wait for all remaining workers.
    pub async fn drain(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            self.record(joined);
        }
    }

    fn record(&mut self, joined: Result<DeliveryOutcome, JoinError>) {
        match joined {
            Ok(Ok(_)) => self.delivered += 1,
            Ok(Err(e)) => {
                log::debug!("Delivery did not complete: {e}");
                self.failed += 1;
            }
            Err(e) => {
                log::error!("Delivery worker panicked: {e}");
                self.failed += 1;
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
