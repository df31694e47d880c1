//! Event subscription reference counting.
//!
//! Every event node owns one [`EventHolder`]. The holder keeps the set of
//! subscribed clients and one [`PrimitiveEvent`] per bank-index
//! combination. An observable is subscribed on the host exactly while the
//! client set is non-empty.

use std::sync::Arc;

use serde_json::Value;

use crate::host::ObservableValue;
use crate::ids::{ClientId, NodeId};

/// A value pushed by the host, routed back to its primitive event.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueChange {
    /// Event node.
    pub event: NodeId,
    /// Index of the primitive inside the node.
    pub primitive: usize,
    /// New value.
    pub value: Value,
}

/// Receives every host change; must hand it to the session queue.
pub type ChangeSink = Arc<dyn Fn(ValueChange) + Send + Sync>;

/// A delayed current-value replay for a first subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingReplay {
    /// Event node.
    pub event: NodeId,
    /// Index of the primitive inside the node.
    pub primitive: usize,
    /// Client that subscribed.
    pub client: ClientId,
}

/// Event notification ready to be encoded.
#[derive(Clone, Debug, PartialEq)]
pub struct EventPayload {
    /// Absolute event name.
    pub event: String,
    /// Notification parameters (bank indexes first).
    pub params: Vec<Value>,
}

/// What a subscribe call produced for the calling client.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscribeOutcome {
    /// Values to send right after the response.
    pub immediate: Vec<EventPayload>,
    /// Replays to schedule after the replay delay.
    pub replays: Vec<PendingReplay>,
}

/// Enumerate every index tuple for the given bank dimensions.
///
/// Each new dimension varies in the outer loop: `[2, 3]` yields
/// `[0,0] [1,0] [0,1] [1,1] [0,2] [1,2]`.
pub fn bank_combinations(dims: &[usize]) -> Vec<Vec<usize>> {
    let mut combos: Vec<Vec<usize>> = vec![Vec::new()];
    for &size in dims {
        let mut next = Vec::with_capacity(combos.len() * size);
        for index in 0..size {
            for combo in &combos {
                let mut extended = combo.clone();
                extended.push(index);
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

/// One observable at one bank-index combination.
pub struct PrimitiveEvent {
    bank_indexes: Vec<usize>,
    observable: Arc<dyn ObservableValue>,
    last_reported: Option<Value>,
    host_triggered: bool,
}

impl PrimitiveEvent {
    /// Wrap an observable obtained at `bank_indexes`.
    pub fn new(bank_indexes: Vec<usize>, observable: Arc<dyn ObservableValue>) -> Self {
        Self {
            bank_indexes,
            observable,
            last_reported: None,
            host_triggered: false,
        }
    }

    /// Bank indexes of this primitive.
    pub fn bank_indexes(&self) -> &[usize] {
        &self.bank_indexes
    }

    /// Whether the host pushed since the last (re)subscription.
    pub fn host_triggered(&self) -> bool {
        self.host_triggered
    }

    /// Last value the host pushed.
    pub fn last_reported(&self) -> Option<&Value> {
        self.last_reported.as_ref()
    }

    /// Align the host subscription with the client count.
    ///
    /// Returns `true` only on the transition to subscribed.
    fn sync(&mut self, has_clients: bool) -> bool {
        let subscribed = self.observable.is_subscribed();
        if !has_clients && subscribed {
            self.observable.unsubscribe();
            false
        } else if has_clients && !subscribed {
            self.host_triggered = false;
            self.observable.subscribe();
            true
        } else {
            false
        }
    }

    fn known_value(&self) -> Option<Value> {
        let value = self
            .last_reported
            .clone()
            .unwrap_or_else(|| self.observable.current());
        (!value.is_null()).then_some(value)
    }

    fn params_for(&self, value: Value) -> Vec<Value> {
        let mut params: Vec<Value> = self.bank_indexes.iter().map(|&i| Value::from(i)).collect();
        match value {
            Value::Array(items) => params.extend(items),
            other => params.push(other),
        }
        params
    }

    /// Payloads describing the current value: one per element for
    /// collections, one overall otherwise.
    fn current_payloads(&self, event: &str) -> Vec<EventPayload> {
        let Some(value) = self.known_value() else {
            return Vec::new();
        };
        if self.observable.is_collection() {
            let items = match value {
                Value::Array(items) => items,
                other => vec![other],
            };
            items
                .into_iter()
                .map(|item| {
                    let mut params: Vec<Value> =
                        self.bank_indexes.iter().map(|&i| Value::from(i)).collect();
                    params.push(item);
                    EventPayload {
                        event: event.to_owned(),
                        params,
                    }
                })
                .collect()
        } else {
            vec![EventPayload {
                event: event.to_owned(),
                params: self.params_for(value),
            }]
        }
    }
}

/// Subscriber set plus primitives of one event node.
#[derive(Default)]
pub struct EventHolder {
    primitives: Vec<PrimitiveEvent>,
    clients: Vec<ClientId>,
}

impl EventHolder {
    /// Create a holder over materialized primitives.
    pub fn new(primitives: Vec<PrimitiveEvent>) -> Self {
        Self {
            primitives,
            clients: Vec::new(),
        }
    }

    /// Primitives in bank-combination order.
    pub fn primitives(&self) -> &[PrimitiveEvent] {
        &self.primitives
    }

    /// Subscribed clients in subscription order.
    pub fn clients(&self) -> &[ClientId] {
        &self.clients
    }

    /// Whether `client` is subscribed.
    pub fn is_subscribed(&self, client: &ClientId) -> bool {
        self.clients.contains(client)
    }

    /// Add `client`; a repeated subscribe is a no-op.
    pub fn subscribe(&mut self, event: NodeId, name: &str, client: &ClientId) -> SubscribeOutcome {
        let mut outcome = SubscribeOutcome::default();
        if self.is_subscribed(client) {
            return outcome;
        }
        self.clients.push(client.clone());
        for (index, primitive) in self.primitives.iter_mut().enumerate() {
            let first = primitive.sync(true);
            if first && !primitive.observable.is_collection() {
                outcome.replays.push(PendingReplay {
                    event,
                    primitive: index,
                    client: client.clone(),
                });
            } else {
                outcome.immediate.extend(primitive.current_payloads(name));
            }
        }
        outcome
    }

    /// Remove `client`. Returns whether it was subscribed.
    pub fn unsubscribe(&mut self, client: &ClientId) -> bool {
        let before = self.clients.len();
        self.clients.retain(|c| c != client);
        let removed = self.clients.len() != before;
        self.sync_all();
        removed
    }

    /// Drop every subscriber and release the host subscriptions.
    pub fn clear(&mut self) {
        self.clients.clear();
        self.sync_all();
    }

    fn sync_all(&mut self) {
        let has_clients = !self.clients.is_empty();
        for primitive in &mut self.primitives {
            let _ = primitive.sync(has_clients);
        }
    }

    /// Record a host push and build the notification for all subscribers.
    pub fn on_value_changed(
        &mut self,
        name: &str,
        primitive: usize,
        value: Value,
    ) -> Option<(EventPayload, Vec<ClientId>)> {
        let primitive = self.primitives.get_mut(primitive)?;
        primitive.host_triggered = true;
        primitive.last_reported = Some(value.clone());
        let payload = EventPayload {
            event: name.to_owned(),
            params: primitive.params_for(value),
        };
        Some((payload, self.clients.clone()))
    }

    /// Resolve a pending replay.
    ///
    /// Yields nothing when the host pushed in the meantime, the client
    /// left, or no value is known.
    pub fn replay(&self, name: &str, pending: &PendingReplay) -> Option<EventPayload> {
        if !self.is_subscribed(&pending.client) {
            return None;
        }
        let primitive = self.primitives.get(pending.primitive)?;
        if primitive.host_triggered {
            return None;
        }
        let value = primitive.known_value()?;
        Some(EventPayload {
            event: name.to_owned(),
            params: primitive.params_for(value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ObservableCell;
    use serde_json::json;

    fn holder_with(cells: &[Arc<ObservableCell>], dims: &[usize]) -> EventHolder {
        let combos = bank_combinations(dims);
        let primitives = combos
            .into_iter()
            .zip(cells.iter())
            .map(|(combo, cell)| {
                let obs: Arc<dyn ObservableValue> = cell.clone();
                PrimitiveEvent::new(combo, obs)
            })
            .collect();
        EventHolder::new(primitives)
    }

    const EVENT: NodeId = NodeId(7);

    // ── bank_combinations ───────────────────────────────────────────

    #[test]
    fn combinations_order() {
        let combos = bank_combinations(&[2, 3]);
        assert_eq!(
            combos,
            vec![
                vec![0, 0],
                vec![1, 0],
                vec![0, 1],
                vec![1, 1],
                vec![0, 2],
                vec![1, 2]
            ]
        );
    }

    #[test]
    fn combinations_without_banks() {
        assert_eq!(bank_combinations(&[]), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn combinations_count_is_product() {
        assert_eq!(bank_combinations(&[4, 3, 2]).len(), 24);
        assert!(bank_combinations(&[3, 0]).is_empty());
    }

    // ── subscribe / unsubscribe ─────────────────────────────────────

    #[test]
    fn first_subscriber_gets_deferred_replay() {
        let cell = Arc::new(ObservableCell::new(json!(120.0)));
        let mut holder = holder_with(&[cell.clone()], &[]);
        let a = ClientId::from("a");

        let outcome = holder.subscribe(EVENT, "transport.tempo", &a);
        assert!(outcome.immediate.is_empty());
        assert_eq!(
            outcome.replays,
            vec![PendingReplay {
                event: EVENT,
                primitive: 0,
                client: a
            }]
        );
        assert_eq!(cell.subscribe_calls(), 1);
    }

    #[test]
    fn second_subscriber_gets_immediate_value() {
        let cell = Arc::new(ObservableCell::new(json!(true)));
        let mut holder = holder_with(&[cell.clone()], &[]);
        let _ = holder.subscribe(EVENT, "transport.isPlaying", &ClientId::from("a"));

        let outcome = holder.subscribe(EVENT, "transport.isPlaying", &ClientId::from("b"));
        assert!(outcome.replays.is_empty());
        assert_eq!(
            outcome.immediate,
            vec![EventPayload {
                event: "transport.isPlaying".into(),
                params: vec![json!(true)]
            }]
        );
        assert_eq!(cell.subscribe_calls(), 1);
    }

    #[test]
    fn repeated_subscribe_is_idempotent() {
        let cell = Arc::new(ObservableCell::new(json!(1)));
        let mut holder = holder_with(&[cell.clone()], &[]);
        let a = ClientId::from("a");
        let _ = holder.subscribe(EVENT, "e", &a);
        let again = holder.subscribe(EVENT, "e", &a);
        assert_eq!(again, SubscribeOutcome::default());
        assert_eq!(holder.clients().len(), 1);
    }

    #[test]
    fn last_unsubscribe_releases_once() {
        let cell = Arc::new(ObservableCell::new(json!(1)));
        let mut holder = holder_with(&[cell.clone()], &[]);
        let (a, b) = (ClientId::from("a"), ClientId::from("b"));
        let _ = holder.subscribe(EVENT, "e", &a);
        let _ = holder.subscribe(EVENT, "e", &b);

        assert!(holder.unsubscribe(&a));
        assert_eq!(cell.unsubscribe_calls(), 0);
        assert!(holder.unsubscribe(&b));
        assert_eq!(cell.unsubscribe_calls(), 1);
        assert!(!holder.unsubscribe(&b));
        assert_eq!(cell.unsubscribe_calls(), 1);
        assert!(!cell.is_subscribed());
    }

    #[test]
    fn collection_values_reported_per_element() {
        let cell = Arc::new(ObservableCell::collection(json!(["Song A", "Song B"])));
        let mut holder = holder_with(&[cell], &[]);
        let outcome = holder.subscribe(EVENT, "application.projectNames", &ClientId::from("a"));
        assert!(outcome.replays.is_empty());
        let params: Vec<_> = outcome.immediate.iter().map(|p| p.params.clone()).collect();
        assert_eq!(params, vec![vec![json!("Song A")], vec![json!("Song B")]]);
    }

    // ── host changes and replay ─────────────────────────────────────

    #[test]
    fn banked_change_prefixes_indexes() {
        let cells: Vec<_> = (0..2).map(|_| Arc::new(ObservableCell::new(json!(0.0)))).collect();
        let mut holder = holder_with(&cells, &[2]);
        let a = ClientId::from("a");
        let _ = holder.subscribe(EVENT, "track.volume", &a);

        let (payload, targets) = holder.on_value_changed("track.volume", 1, json!(0.8)).unwrap();
        assert_eq!(payload.params, vec![json!(1), json!(0.8)]);
        assert_eq!(targets, vec![a]);
        assert!(holder.primitives()[1].host_triggered());
        assert_eq!(holder.primitives()[1].last_reported(), Some(&json!(0.8)));
    }

    #[test]
    fn array_value_is_spread() {
        let cell = Arc::new(ObservableCell::new(json!([1, 2])));
        let mut holder = holder_with(&[cell], &[]);
        let (payload, _) = holder.on_value_changed("e", 0, json!([3, 4])).unwrap();
        assert_eq!(payload.params, vec![json!(3), json!(4)]);
    }

    #[test]
    fn replay_skipped_after_host_push() {
        let cell = Arc::new(ObservableCell::new(json!(1)));
        let mut holder = holder_with(&[cell], &[]);
        let a = ClientId::from("a");
        let outcome = holder.subscribe(EVENT, "e", &a);
        let pending = outcome.replays[0].clone();

        let _ = holder.on_value_changed("e", 0, json!(2));
        assert!(holder.replay("e", &pending).is_none());
    }

    #[test]
    fn replay_skipped_after_unsubscribe() {
        let cell = Arc::new(ObservableCell::new(json!(1)));
        let mut holder = holder_with(&[cell], &[]);
        let a = ClientId::from("a");
        let pending = holder.subscribe(EVENT, "e", &a).replays.remove(0);
        let _ = holder.unsubscribe(&a);
        assert!(holder.replay("e", &pending).is_none());
    }

    #[test]
    fn replay_falls_back_to_current_value() {
        let cell = Arc::new(ObservableCell::new(json!("Bass")));
        let mut holder = holder_with(&[cell], &[]);
        let a = ClientId::from("a");
        let pending = holder.subscribe(EVENT, "track.name", &a).replays.remove(0);
        let payload = holder.replay("track.name", &pending).unwrap();
        assert_eq!(payload.params, vec![json!("Bass")]);
    }

    #[test]
    fn replay_needs_a_value() {
        let cell = Arc::new(ObservableCell::new(Value::Null));
        let mut holder = holder_with(&[cell], &[]);
        let a = ClientId::from("a");
        let pending = holder.subscribe(EVENT, "e", &a).replays.remove(0);
        assert!(holder.replay("e", &pending).is_none());
    }

    #[test]
    fn resubscribe_resets_host_triggered() {
        let cell = Arc::new(ObservableCell::new(json!(1)));
        let mut holder = holder_with(&[cell], &[]);
        let a = ClientId::from("a");
        let _ = holder.subscribe(EVENT, "e", &a);
        let _ = holder.on_value_changed("e", 0, json!(2));
        let _ = holder.unsubscribe(&a);

        let pending = holder.subscribe(EVENT, "e", &a).replays.remove(0);
        assert!(!holder.primitives()[0].host_triggered());
        let payload = holder.replay("e", &pending).unwrap();
        assert_eq!(payload.params, vec![json!(2)]);
    }

    #[test]
    fn clear_releases_everything() {
        let cell = Arc::new(ObservableCell::new(json!(1)));
        let mut holder = holder_with(&[cell.clone()], &[]);
        let _ = holder.subscribe(EVENT, "e", &ClientId::from("a"));
        let _ = holder.subscribe(EVENT, "e", &ClientId::from("b"));
        holder.clear();
        assert!(holder.clients().is_empty());
        assert_eq!(cell.unsubscribe_calls(), 1);
    }
}
