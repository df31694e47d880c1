//! Per-call context handed to built-in methods.

use hostrpc_registry::{ClientId, PendingReplay, Registry};
use serde_json::Value;

use crate::builtins::BuiltinRegistry;
use crate::types::Notification;

/// Side effects a message produced besides its reply.
#[derive(Debug, Default)]
pub struct Effects {
    /// Notifications for the calling client, written after the reply.
    pub notifications: Vec<Notification>,
    /// Notifications for every connected client.
    pub broadcasts: Vec<Notification>,
    /// Current-value replays to schedule.
    pub replays: Vec<PendingReplay>,
}

impl Effects {
    /// Whether nothing besides the reply is pending.
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty() && self.broadcasts.is_empty() && self.replays.is_empty()
    }
}

/// Everything a built-in method may touch.
pub struct CallContext<'a> {
    /// Calling client.
    pub client: &'a ClientId,
    /// Graph registry of the session.
    pub registry: &'a mut Registry,
    /// Built-in table, for reports.
    pub builtins: &'a BuiltinRegistry,
    /// Active settings rendered as JSON.
    pub config: &'a Value,
    /// Collected side effects.
    pub effects: &'a mut Effects,
}
