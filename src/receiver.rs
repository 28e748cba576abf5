use crate::contacts::{display_name, ContactResolver};
use crate::delivery::{DeliveryConfig, DeliveryOutcome, DeliveryPipeline, WorkerSet};
use crate::event_log::{LogLevel, LogSink};
use crate::filter::classify;
use crate::message::InboundMessage;
use crate::relay::Transport;
use crate::store::{FilterConfigStore, SecretStore};

use std::sync::Arc;
use tokio::task::JoinHandle;

/// Collaborators the receiver reads from on every message.
pub struct ReceiverStores {
    pub filters: Arc<dyn FilterConfigStore>,
    pub contacts: Arc<dyn ContactResolver>,
    pub topic: Arc<dyn SecretStore>,
    pub password: Arc<dyn SecretStore>,
}

/// Entry point for inbound message events.
///
/// Classification runs inline; forwarded messages are handed to the
/// delivery pipeline on their own task so this path never waits on the
/// network.
pub struct SmsReceiver<T: Transport> {
    stores: ReceiverStores,
    endpoint_base: String,
    log: Arc<dyn LogSink>,
    pipeline: Arc<DeliveryPipeline<T>>,
}

impl<T: Transport> SmsReceiver<T> {
    pub fn new(
        stores: ReceiverStores,
        endpoint_base: &str,
        log: Arc<dyn LogSink>,
        pipeline: Arc<DeliveryPipeline<T>>,
    ) -> Self {
        Self {
            stores,
            endpoint_base: endpoint_base.to_string(),
            log,
            pipeline,
        }
    }

    pub fn pipeline(&self) -> &Arc<DeliveryPipeline<T>> {
        &self.pipeline
    }

    /// Returns the worker handle when the message is forwarded.
    pub fn on_message(&self, message: InboundMessage) -> Option<JoinHandle<DeliveryOutcome>> {
        let (message, name, config) = self.prepare(message)?;
        Some(self.pipeline.dispatch(message, name, config))
    }

    /// Like [`SmsReceiver::on_message`], but the worker joins `workers`.
    /// Returns whether the message was forwarded.
    pub fn on_message_into(&self, message: InboundMessage, workers: &mut WorkerSet) -> bool {
        match self.prepare(message) {
            Some((message, name, config)) => {
                workers.spawn(self.pipeline.worker(message, name, config));
                true
            }
            None => false,
        }
    }

    fn prepare(&self, message: InboundMessage) -> Option<(InboundMessage, String, DeliveryConfig)> {
        let filters = self.stores.filters.get();
        let classification =
            match classify(message.sender.as_deref(), message.body.as_deref(), &filters) {
                Ok(classification) => classification,
                Err(e) => {
                    self.log.append(
                        LogLevel::Error,
                        "Message classification failed",
                        Some(&e.to_string()),
                    );
                    return None;
                }
            };

        log::debug!(
            "Message received at {} classified as {classification}",
            message.received_at.format("%H:%M:%S")
        );

        if !classification.should_forward() {
            return None;
        }

        let name = display_name(self.stores.contacts.as_ref(), message.sender.as_deref());
        let config = DeliveryConfig {
            topic: self.stores.topic.get(),
            password: self.stores.password.get(),
            endpoint_base: self.endpoint_base.clone(),
        };
        Some((message, name, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher;
    use crate::config::FilterConfig;
    use crate::delivery::DeliveryError;
    use crate::contacts::ContactBook;
    use crate::device::{DeviceLabelResolver, LabelSource};
    use crate::event_log::EventLog;
    use crate::store::{MemoryFilterStore, StaticSecret};
    use crate::testing::{RecordingNotifier, ScriptedTransport};
    use std::collections::HashMap;

    fn receiver(
        filters: Arc<MemoryFilterStore>,
        password: Option<&str>,
    ) -> (SmsReceiver<ScriptedTransport>, Arc<EventLog>) {
        let log = Arc::new(EventLog::in_memory());
        let pipeline = DeliveryPipeline::new(
            ScriptedTransport::default(),
            log.clone(),
            Arc::new(RecordingNotifier::default()),
            DeviceLabelResolver::new(vec![LabelSource::Fixed("Laptop".to_string())]),
        );

        let mut contacts = HashMap::new();
        contacts.insert("+15551234567".to_string(), "Alice".to_string());

        let stores = ReceiverStores {
            filters,
            contacts: Arc::new(ContactBook::new(&contacts)),
            topic: Arc::new(StaticSecret::new(Some("topic".to_string()))),
            password: Arc::new(StaticSecret::new(password.map(str::to_string))),
        };
        let receiver = SmsReceiver::new(
            stores,
            "https://relay.example",
            log.clone(),
            Arc::new(pipeline),
        );
        (receiver, log)
    }

    #[tokio::test]
    async fn test_forwarded_message_uses_contact_name() {
        let (receiver, _log) = receiver(Arc::new(MemoryFilterStore::default()), Some("pw"));

        let handle = receiver
            .on_message(InboundMessage::new(
                Some("+1 555 123 4567".to_string()),
                Some("Your verification code is 123456".to_string()),
            ))
            .expect("message should be forwarded");
        handle.await.unwrap().unwrap();

        let requests = receiver.pipeline().transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].title, "SMS from Alice");
        assert_eq!(
            cipher::decrypt(&requests[0].body, "pw").unwrap(),
            "Alice|Your verification code is 123456|Laptop"
        );
    }

    #[tokio::test]
    async fn test_dropped_message_is_not_dispatched() {
        let (receiver, log) = receiver(Arc::new(MemoryFilterStore::default()), Some("pw"));

        let handle = receiver.on_message(InboundMessage::new(
            Some("PromoCo".to_string()),
            Some("Huge discount! 50% off, unsubscribe now".to_string()),
        ));
        assert!(handle.is_none());
        assert!(receiver.pipeline().transport().requests().is_empty());
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_filter_changes_apply_to_next_message() {
        let filters = Arc::new(MemoryFilterStore::default());
        let (receiver, _log) = receiver(filters.clone(), Some("pw"));
        let chatty = || {
            InboundMessage::new(
                Some("+15550009999".to_string()),
                Some("see you at dinner".to_string()),
            )
        };

        assert!(receiver.on_message(chatty()).is_none());

        filters.set_forward_all(true);
        let handle = receiver.on_message(chatty()).expect("forward_all should forward");
        handle.await.unwrap().unwrap();
        assert_eq!(receiver.pipeline().transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_password_reported_by_worker() {
        let (receiver, log) = receiver(Arc::new(MemoryFilterStore::default()), None);

        let handle = receiver
            .on_message(InboundMessage::new(
                Some("HDFC-Bank".to_string()),
                Some("Your OTP is 4821".to_string()),
            ))
            .unwrap();
        assert!(matches!(
            handle.await.unwrap(),
            Err(DeliveryError::MissingPassword)
        ));
        assert_eq!(log.count_level(LogLevel::Warning), 1);
        assert!(receiver.pipeline().transport().requests().is_empty());
    }

    #[tokio::test]
    async fn test_tracked_messages_join_worker_set() {
        let (receiver, _log) = receiver(Arc::new(MemoryFilterStore::default()), Some("pw"));
        let mut workers = WorkerSet::new();

        assert!(receiver.on_message_into(
            InboundMessage::new(Some("HDFC-Bank".to_string()), Some("Your OTP is 4821".to_string())),
            &mut workers,
        ));
        assert!(!receiver.on_message_into(
            InboundMessage::new(Some("+15550009999".to_string()), Some("see you at dinner".to_string())),
            &mut workers,
        ));
        assert_eq!(workers.in_flight(), 1);

        workers.drain().await;
        assert_eq!(workers.delivered(), 1);
        assert_eq!(receiver.pipeline().transport().requests().len(), 1);
    }

    struct BrokenFilters;

    impl FilterConfigStore for BrokenFilters {
        fn get(&self) -> FilterConfig {
            FilterConfig {
                important_senders: vec![],
                important_keywords: vec![],
                otp_pattern: "(".to_string(),
                ..FilterConfig::default()
            }
        }
    }

    #[tokio::test]
    async fn test_classification_error_is_logged_and_dropped() {
        let (mut receiver, log) = receiver(Arc::new(MemoryFilterStore::default()), Some("pw"));
        receiver.stores.filters = Arc::new(BrokenFilters);

        let handle = receiver.on_message(InboundMessage::new(
            Some("friend".to_string()),
            Some("hello".to_string()),
        ));
        assert!(handle.is_none());
        assert_eq!(log.count_level(LogLevel::Error), 1);
    }
}
