// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scripted [`Transport`] double used by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::command::OutboundCommand;
use crate::error::ProtocolError;
use crate::protocol::{Delivery, InboundMessage, SessionInfo, TopicFilter, Transport};

/// A call made on the double, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    StartConsuming,
    StopConsuming,
    Connect,
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    Acknowledge(InboundMessage),
    Publish(OutboundCommand),
    Close,
}

/// One scripted answer to `receive`.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// Returned immediately.
    Deliver(Delivery),
    /// `None` while the consumer is open.
    LinkLoss,
    /// Returned only once the consumer has been closed, modelling a message
    /// already pulled off the queue when shutdown starts.
    AfterStop(Delivery),
}

impl Step {
    pub(crate) fn message(topic: &str, payload: &str) -> Self {
        Self::Deliver(Delivery::Message(InboundMessage::new(topic, payload)))
    }

    pub(crate) fn resumed(session_present: bool) -> Self {
        Self::Deliver(Delivery::Resumed(SessionInfo { session_present }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Consumer {
    Idle,
    Consuming,
    Closed,
}

#[derive(Debug)]
pub(crate) struct ScriptedTransport {
    calls: Mutex<Vec<Call>>,
    script: Mutex<VecDeque<Step>>,
    consumer: watch::Sender<Consumer>,
    idle: watch::Sender<bool>,
    session_present: bool,
    persistent: bool,
    connect_delay: Option<Duration>,
    fail_connect: bool,
    fail_subscribe: bool,
    fail_publish: AtomicBool,
    publish_delay: Option<Duration>,
}

impl ScriptedTransport {
    pub(crate) fn new(session_present: bool, steps: Vec<Step>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(steps.into()),
            consumer: watch::channel(Consumer::Idle).0,
            idle: watch::channel(false).0,
            session_present,
            persistent: true,
            connect_delay: None,
            fail_connect: false,
            fail_subscribe: false,
            fail_publish: AtomicBool::new(false),
            publish_delay: None,
        }
    }

    pub(crate) fn with_clean_session(mut self) -> Self {
        self.persistent = false;
        self
    }

    pub(crate) fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub(crate) fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub(crate) fn failing_subscribe(mut self) -> Self {
        self.fail_subscribe = true;
        self
    }

    pub(crate) fn with_publish_delay(mut self, delay: Duration) -> Self {
        self.publish_delay = Some(delay);
        self
    }

    pub(crate) fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub(crate) fn published(&self) -> Vec<OutboundCommand> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Publish(cmd) => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn acknowledged(&self) -> Vec<InboundMessage> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Acknowledge(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Resolves once the script is exhausted and the consumer is parked in
    /// `receive`.
    pub(crate) async fn wait_idle(&self) {
        let mut rx = self.idle.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    async fn wait_closed(&self) {
        let mut rx = self.consumer.subscribe();
        while *rx.borrow_and_update() == Consumer::Consuming {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

fn paths(filters: &[TopicFilter]) -> Vec<String> {
    filters.iter().map(|f| f.path().to_string()).collect()
}

impl Transport for ScriptedTransport {
    fn start_consuming(&self) {
        self.record(Call::StartConsuming);
        self.consumer.send_if_modified(|state| {
            if *state == Consumer::Idle {
                *state = Consumer::Consuming;
                true
            } else {
                false
            }
        });
    }

    fn stop_consuming(&self) {
        self.record(Call::StopConsuming);
        self.consumer.send_replace(Consumer::Closed);
    }

    fn is_consumer_closed(&self) -> bool {
        *self.consumer.borrow() != Consumer::Consuming
    }

    fn is_session_persistent(&self) -> bool {
        self.persistent
    }

    async fn connect(&self) -> Result<SessionInfo, ProtocolError> {
        self.record(Call::Connect);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect {
            return Err(ProtocolError::ConnectionFailed("scripted failure".to_string()));
        }
        Ok(SessionInfo {
            session_present: self.session_present,
        })
    }

    async fn subscribe(&self, filters: &[TopicFilter]) -> Result<(), ProtocolError> {
        self.record(Call::Subscribe(paths(filters)));
        if self.fail_subscribe {
            return Err(ProtocolError::NotConnected);
        }
        Ok(())
    }

    async fn unsubscribe(&self, filters: &[TopicFilter]) -> Result<(), ProtocolError> {
        self.record(Call::Unsubscribe(paths(filters)));
        Ok(())
    }

    async fn receive(&self) -> Option<Delivery> {
        if self.is_consumer_closed() {
            return None;
        }

        let step = self.script.lock().pop_front();
        match step {
            Some(Step::Deliver(delivery)) => Some(delivery),
            Some(Step::LinkLoss) => None,
            Some(Step::AfterStop(delivery)) => {
                self.wait_closed().await;
                Some(delivery)
            }
            None => {
                self.idle.send_replace(true);
                self.wait_closed().await;
                None
            }
        }
    }

    async fn acknowledge(&self, message: &InboundMessage) -> Result<(), ProtocolError> {
        self.record(Call::Acknowledge(message.clone()));
        Ok(())
    }

    async fn publish(&self, command: &OutboundCommand) -> Result<(), ProtocolError> {
        if let Some(delay) = self.publish_delay {
            tokio::time::sleep(delay).await;
        }
        self.record(Call::Publish(command.clone()));
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(ProtocolError::NotConnected);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ProtocolError> {
        self.record(Call::Close);
        Ok(())
    }
}
