//! Wallet lifecycle notifications
//!
//! Published on a [`tokio::sync::broadcast`] channel: publishing never
//! blocks, and a subscriber that falls behind loses the oldest events.

use crate::wallet::{VaultWallet, Wallet};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events buffered per subscriber before the oldest are dropped
pub const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletEventKind {
    /// A wallet was added to the backend
    Arrived,
    /// A wallet authenticated with its Vault
    Opened,
    /// A wallet was removed from the backend
    Dropped,
    /// A wallet's session was closed
    Closed,
}

#[derive(Debug, Clone)]
pub struct WalletEvent {
    pub wallet: Arc<VaultWallet>,
    pub kind: WalletEventKind,
}

/// Fire-and-forget publisher shared by a backend and its wallets
#[derive(Debug, Clone)]
pub struct EventFeed {
    sender: broadcast::Sender<WalletEvent>,
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl EventFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Publish to current subscribers; no subscribers is not an error
    pub fn send(&self, wallet: Arc<VaultWallet>, kind: WalletEventKind) {
        tracing::debug!(wallet = %wallet.url(), kind = ?kind, "Wallet event");
        let _ = self.sender.send(WalletEvent { wallet, kind });
    }

    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with(Vec::new())
    }

    /// Subscribe with `backlog` delivered ahead of any published event
    pub fn subscribe_with(&self, backlog: Vec<WalletEvent>) -> Subscription {
        Subscription {
            receiver: Some(self.sender.subscribe()),
            backlog: backlog.into(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Handle for receiving wallet events; dropping it unsubscribes
#[derive(Debug)]
pub struct Subscription {
    receiver: Option<broadcast::Receiver<WalletEvent>>,
    backlog: VecDeque<WalletEvent>,
}

impl Subscription {
    /// Next event, or `None` once unsubscribed or the feed is gone
    ///
    /// Events missed because this subscriber lagged are skipped.
    pub async fn recv(&mut self) -> Option<WalletEvent> {
        loop {
            let receiver = self.receiver.as_mut()?;
            if let Some(event) = self.backlog.pop_front() {
                return Some(event);
            }
            match receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Wallet event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<WalletEvent> {
        loop {
            let receiver = self.receiver.as_mut()?;
            if let Some(event) = self.backlog.pop_front() {
                return Some(event);
            }
            match receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    pub fn unsubscribe(&mut self) {
        self.receiver = None;
        self.backlog.clear();
    }

    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }
}
