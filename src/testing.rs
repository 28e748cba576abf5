//! Test doubles for the delivery collaborators.

use crate::notify::NotificationSink;
use crate::relay::{RelayRequest, Transport, TransportError};

use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays scripted results in order, then succeeds.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<(), TransportError>>>,
    requests: Mutex<Vec<RelayRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Result<(), TransportError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RelayRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    async fn post(&self, request: &RelayRequest) -> Result<(), TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<(bool, String, String)>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<(bool, String, String)> {
        self.notifications.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, success: bool, title: &str, body: &str) {
        self.notifications
            .lock()
            .unwrap()
            .push((success, title.to_string(), body.to_string()));
    }
}
