pub mod cipher;
pub mod config;
pub mod contacts;
pub mod delivery;
pub mod device;
pub mod event_log;
pub mod filter;
pub mod message;
pub mod notify;
pub mod receiver;
pub mod relay;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Config, FilterConfig};
pub use delivery::{
    DeliveryConfig, DeliveryError, DeliveryOutcome, DeliveryPipeline, RetryPolicy, WorkerSet,
};
pub use event_log::{EventLog, LogLevel, LogSink};
pub use filter::{classify, Classification, Decision, MatchedRule};
pub use message::InboundMessage;
pub use receiver::{ReceiverStores, SmsReceiver};
