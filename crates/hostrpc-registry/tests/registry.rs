//! Registry construction, dispatch and events over a small mixer graph.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_matches::assert_matches;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::Level;

use hostrpc_registry::{
    BuildError, ClientId, HostError, HostObject, HostValue, InvokeError, MethodIdentifier,
    MethodSchema, ModuleSpec, ObservableCell, ObservableValue, ParamKind, Registry,
    RegistryBuilder, SchemaCatalog, TypeSchema, ValueChange,
};

// ── Fixture host ────────────────────────────────────────────────────

struct SendSlot {
    value: Arc<ObservableCell>,
}

impl HostObject for SendSlot {
    fn invoke(&self, method: &str, args: &[Value]) -> Result<HostValue, HostError> {
        match method {
            "value" => Ok(HostValue::Observable(self.value.clone())),
            _ => Err(HostError::unknown_method(method, args.len())),
        }
    }
}

struct Bank<T> {
    items: Vec<Arc<T>>,
    lookups: AtomicUsize,
    count: Arc<ObservableCell>,
}

impl<T> Bank<T> {
    fn new(items: Vec<Arc<T>>) -> Self {
        let count = Arc::new(ObservableCell::new(json!(items.len())));
        Self {
            items,
            lookups: AtomicUsize::new(0),
            count,
        }
    }
}

impl<T: HostObject + 'static> HostObject for Bank<T> {
    fn invoke(&self, method: &str, args: &[Value]) -> Result<HostValue, HostError> {
        match (method, args) {
            ("getItemAt", [index]) => {
                let _ = self.lookups.fetch_add(1, Ordering::SeqCst);
                let item = index
                    .as_u64()
                    .and_then(|i| self.items.get(usize::try_from(i).ok()?))
                    .ok_or_else(|| HostError::new("index out of range"))?;
                let object: Arc<dyn HostObject> = item.clone();
                Ok(HostValue::Object(object))
            }
            ("itemCount", []) => Ok(HostValue::Observable(self.count.clone())),
            _ => Err(HostError::unknown_method(method, args.len())),
        }
    }
}

struct Track {
    name: Arc<ObservableCell>,
    volume: Arc<ObservableCell>,
    sends: Arc<Bank<SendSlot>>,
}

impl HostObject for Track {
    fn invoke(&self, method: &str, args: &[Value]) -> Result<HostValue, HostError> {
        match (method, args) {
            ("name", []) => Ok(HostValue::Observable(self.name.clone())),
            ("volume", []) => Ok(HostValue::Observable(self.volume.clone())),
            ("sendBank", []) => Ok(HostValue::Object(self.sends.clone())),
            ("setName", [Value::String(name)]) => {
                self.name.set(json!(name));
                Ok(HostValue::Void)
            }
            _ => Err(HostError::unknown_method(method, args.len())),
        }
    }
}

struct Mixer {
    tracks: Arc<Bank<Track>>,
    playing: Arc<ObservableCell>,
    flaky_calls: AtomicUsize,
}

impl HostObject for Mixer {
    fn invoke(&self, method: &str, args: &[Value]) -> Result<HostValue, HostError> {
        match (method, args) {
            ("trackBank", []) => Ok(HostValue::Object(self.tracks.clone())),
            ("isPlaying", []) => Ok(HostValue::Observable(self.playing.clone())),
            ("mode", []) => Ok(json!("arrange").into()),
            ("broken", []) => Err(HostError::new("not available in this host version")),
            ("flaky", []) => {
                let _ = self.flaky_calls.fetch_add(1, Ordering::SeqCst);
                Err(HostError::new("device gone"))
            }
            ("add", [a, b]) => Ok(json!(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0)).into()),
            ("add", [a, b, c]) => Ok(json!(
                a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0) + c.as_f64().unwrap_or(0.0)
            )
            .into()),
            ("join", [Value::Array(parts)]) => Ok(json!(
                parts.iter().filter_map(Value::as_str).collect::<Vec<_>>().join("")
            )
            .into()),
            _ => Err(HostError::unknown_method(method, args.len())),
        }
    }
}

fn catalog() -> SchemaCatalog {
    use ParamKind::{Number, String as Str, StringArray};

    SchemaCatalog::new()
        .with(
            TypeSchema::object("Mixer")
                .method(MethodSchema::new("trackBank").returns_type("TrackBank"))
                .method(MethodSchema::new("sceneBank").returns_type("SceneBank"))
                .method(MethodSchema::new("isPlaying").returns_type("BooleanValue"))
                .method(MethodSchema::new("mode").returns_type("Mode"))
                .method(MethodSchema::new("broken").returns_type("BooleanValue"))
                .method(MethodSchema::new("flaky").returns(Number))
                .method(MethodSchema::new("add").params([Number, Number]).returns(Number))
                .method(
                    MethodSchema::new("add")
                        .params([Number, Number, Number])
                        .returns(Number),
                )
                .method(MethodSchema::new("join").params([StringArray]).returns(Str))
                .method(MethodSchema::new("legacy").returns(Number).deprecated())
                .method(MethodSchema::new("addObserver").with_callback())
                .method(MethodSchema::new("markInterested").hidden())
                .method(MethodSchema::new("createTrack").returns_type("Track").factory())
                .method(
                    MethodSchema::new("copyFrom")
                        .with_host_object_param()
                        .returns(ParamKind::Void),
                ),
        )
        .with(
            TypeSchema::bank("TrackBank", "Track")
                .method(MethodSchema::new("getItemAt").bank_item().returns_type("Track"))
                .method(MethodSchema::new("itemCount").returns_type("IntegerValue")),
        )
        .with(
            TypeSchema::bank("SceneBank", "Scene")
                .method(MethodSchema::new("getItemAt").bank_item().returns_type("Scene")),
        )
        .with(TypeSchema::object("Scene"))
        .with(
            TypeSchema::object("Track")
                .method(MethodSchema::new("name").returns_type("StringValue"))
                .method(MethodSchema::new("volume").returns_type("Parameter"))
                .method(MethodSchema::new("sendBank").returns_type("SendBank"))
                .method(MethodSchema::new("setName").params([Str])),
        )
        .with(
            TypeSchema::bank("SendBank", "Send")
                .method(MethodSchema::new("getItemAt").bank_item().returns_type("Send")),
        )
        .with(TypeSchema::object("Send").method(MethodSchema::new("value").returns_type("NumberValue")))
        .with(TypeSchema::observable("Parameter", Number).parameter())
        .with(TypeSchema::observable("BooleanValue", ParamKind::Boolean))
        .with(TypeSchema::observable("IntegerValue", Number))
        .with(TypeSchema::observable("NumberValue", Number))
        .with(TypeSchema::observable("StringValue", Str))
        .with(TypeSchema::enumeration("Mode"))
}

fn mixer() -> Arc<Mixer> {
    let tracks = (0..2)
        .map(|t| {
            let sends = (0..3)
                .map(|s| {
                    Arc::new(SendSlot {
                        value: Arc::new(ObservableCell::new(json!(f64::from(s) / 10.0))),
                    })
                })
                .collect();
            Arc::new(Track {
                name: Arc::new(ObservableCell::new(json!(format!("Track {}", t + 1)))),
                volume: Arc::new(ObservableCell::new(json!(0.75))),
                sends: Arc::new(Bank::new(sends)),
            })
        })
        .collect();
    Arc::new(Mixer {
        tracks: Arc::new(Bank::new(tracks)),
        playing: Arc::new(ObservableCell::new(json!(false))),
        flaky_calls: AtomicUsize::new(0),
    })
}

fn module(host: &Arc<Mixer>) -> ModuleSpec {
    let root: Arc<dyn HostObject> = host.clone();
    ModuleSpec::new("mixer", "Mixer", root)
        .with_bank_size("TrackBank", 2)
        .with_bank_size("SendBank", 3)
}

fn build(host: &Arc<Mixer>) -> Registry {
    RegistryBuilder::new(catalog()).module(module(host)).build().unwrap()
}

fn id(name: &str, params: &[ParamKind]) -> MethodIdentifier {
    MethodIdentifier::new(name, params.to_vec())
}

// ── Build ───────────────────────────────────────────────────────────

#[test]
fn filtered_methods_are_not_registered() {
    let registry = build(&mixer());
    let names: Vec<_> = registry.identifiers().map(|i| i.name().to_owned()).collect();
    assert!(!names.iter().any(|n| n == "mixer.legacy"));
    assert!(!names.iter().any(|n| n == "mixer.addObserver"));
    assert!(!names.iter().any(|n| n == "mixer.createTrack"));
    assert!(!names.iter().any(|n| n == "mixer.copyFrom"));
    assert!(!names.iter().any(|n| n == "mixer.markInterested"));
}

#[test]
fn bank_without_size_is_skipped() {
    let (logs, _guard) = hostrpc_logging::capture_logs();
    let registry = build(&mixer());
    assert!(
        !registry
            .identifiers()
            .any(|i| i.name().starts_with("mixer.sceneBank"))
    );
    assert!(logs.has_event(Level::DEBUG, "no size for bank, skipping"));
    let skipped = logs
        .events()
        .into_iter()
        .find(|e| e.message.contains("no size for bank"))
        .unwrap();
    assert_eq!(skipped.field("bank"), Some("SceneBank"));
    assert!(!logs.has_event(Level::WARN, "no size for bank"));
}

#[test]
fn duplicate_identifier_is_replaced_with_a_warning() {
    use ParamKind::Number;
    let host = mixer();
    let catalog = catalog().with(
        TypeSchema::object("Mixer")
            .method(MethodSchema::new("add").params([Number, Number]).returns(Number))
            .method(MethodSchema::new("add").params([Number, Number]).returns(Number)),
    );

    let (logs, _guard) = hostrpc_logging::capture_logs();
    let mut registry = RegistryBuilder::new(catalog)
        .module(module(&host))
        .build()
        .unwrap();

    assert!(logs.has_event(Level::WARN, "duplicate method identifier, replacing"));
    assert_eq!(logs.count_at_level(Level::WARN), 1);
    let node = registry.lookup(&id("mixer.add", &[Number, Number])).unwrap();
    let sum = registry.invoke(node, &[json!(2), json!(3)]).unwrap();
    assert_eq!(sum.to_json(), json!(5.0));
}

#[test]
fn abbreviated_names_still_reach_the_host() {
    use ParamKind::{Number, String as Str};
    let host = mixer();
    let mut registry = RegistryBuilder::new(catalog())
        .module(module(&host))
        .abbreviated_names(true)
        .build()
        .unwrap();

    assert!(registry.lookup(&id("mixer.trackBank.getItemAt.volume", &[Number])).is_none());
    let volume = registry.lookup(&id("mixer.trs.at.vol", &[Number])).unwrap();
    assert_eq!(registry.invoke(volume, &[json!(1)]).unwrap().to_json(), json!(0.75));

    let accessor = registry.node(volume).parent().unwrap();
    assert_eq!(registry.node(accessor).name(), "getItemAt");

    let rename = registry.lookup(&id("mixer.trs.at.name", &[Number, Str])).unwrap();
    assert!(registry.invoke(rename, &[json!(0), json!("Kick")]).is_ok());

    assert!(registry.event_id("mixer.trs.at.name").is_some());
    assert!(registry.event_id("mixer.trs.at.sends.at.val").is_some());
    assert!(registry.event_id("mixer.playing").is_some());
    assert!(registry.event_id("mixer.isPlaying").is_none());
    assert_eq!(registry.module_names(), vec!["mixer"]);
}

#[test]
fn non_serializable_objects_are_traversed_but_not_callable() {
    let registry = build(&mixer());
    use ParamKind::Number;
    assert!(registry.lookup(&id("mixer.trackBank", &[])).is_none());
    assert!(
        registry
            .lookup(&id("mixer.trackBank.getItemAt", &[Number]))
            .is_none()
    );
    assert!(
        registry
            .lookup(&id("mixer.trackBank.getItemAt.volume", &[Number]))
            .is_some()
    );
    assert!(
        registry
            .lookup(&id(
                "mixer.trackBank.getItemAt.setName",
                &[Number, ParamKind::String]
            ))
            .is_some()
    );
}

#[test]
fn bank_dimensions_accumulate() {
    let registry = build(&mixer());
    let item = registry
        .event_id("mixer.trackBank.getItemAt.sendBank.getItemAt.value")
        .unwrap();
    let node = registry.node(item);
    assert_eq!(node.bank_dimension(), &[2, 3]);
    assert_eq!(node.params(), &[ParamKind::Number, ParamKind::Number]);

    let accessor = node.parent().unwrap();
    let accessor = registry.node(accessor);
    assert_eq!(accessor.name(), "getItemAt");
    assert_eq!(accessor.bank_item_count(), 3);
}

#[test]
fn primitive_count_is_product_of_dimensions() {
    let registry = build(&mixer());
    let check = |name: &str, expected: usize| {
        let node = registry.node(registry.event_id(name).unwrap());
        let product: usize = node.bank_dimension().iter().product();
        assert_eq!(node.event().unwrap().primitives().len(), expected);
        assert_eq!(product, expected);
    };
    check("mixer.trackBank.getItemAt.sendBank.getItemAt.value", 6);
    check("mixer.trackBank.getItemAt.name", 2);
    check("mixer.isPlaying", 1);
}

#[test]
fn parameter_observables_are_methods() {
    let registry = build(&mixer());
    assert!(registry.event_id("mixer.trackBank.getItemAt.volume").is_none());
    let reports = registry.method_reports();
    let volume = reports
        .iter()
        .find(|r| r.method == "mixer.trackBank.getItemAt.volume")
        .unwrap();
    assert_eq!(volume.params, vec!["number"]);
    assert_eq!(volume.result, "number");
}

#[test]
fn chain_deeper_than_limit_fails() {
    let host = mixer();
    let result = RegistryBuilder::new(catalog())
        .module(module(&host))
        .max_depth(3)
        .build();
    assert_matches!(result, Err(BuildError::ChainTooDeep { max: 3, .. }));
}

#[test]
fn unknown_root_type_fails() {
    let host = mixer();
    let root: Arc<dyn HostObject> = host;
    let result = RegistryBuilder::new(catalog())
        .module(ModuleSpec::new("x", "Nope", root))
        .build();
    assert_matches!(result, Err(BuildError::UnknownType(name)) if name == "Nope");
}

#[test]
fn duplicate_module_fails() {
    let host = mixer();
    let result = RegistryBuilder::new(catalog())
        .module(module(&host))
        .module(module(&host))
        .build();
    assert_matches!(result, Err(BuildError::DuplicateModule(name)) if name == "mixer");
}

#[test]
fn broken_event_is_listed_with_error() {
    let mut registry = build(&mixer());
    let reports = registry.event_reports();
    let broken = reports.iter().find(|r| r.event == "mixer.broken").unwrap();
    assert_eq!(
        broken.error.as_deref(),
        Some("not available in this host version")
    );
    let err = registry
        .subscribe("mixer.broken", &ClientId::from("a"))
        .unwrap_err();
    assert_eq!(err.to_string(), "not available in this host version");
}

#[test]
fn event_report_omits_empty_dimension() {
    let registry = build(&mixer());
    let reports = registry.event_reports();
    let playing = reports.iter().find(|r| r.event == "mixer.isPlaying").unwrap();
    let json = serde_json::to_value(playing).unwrap();
    assert_eq!(json, json!({"event": "mixer.isPlaying"}));
    let sends = reports
        .iter()
        .find(|r| r.event.ends_with("sendBank.getItemAt.value"))
        .unwrap();
    assert_eq!(serde_json::to_value(sends).unwrap()["bankDimension"], json!([2, 3]));
}

// ── Resolve and invoke ──────────────────────────────────────────────

#[test]
fn overloads_resolve_by_arity() {
    let mut registry = build(&mixer());
    use ParamKind::Number;
    let two = registry.resolve("mixer.add", &[Number, Number]).unwrap();
    let three = registry.resolve("mixer.add", &[Number, Number, Number]).unwrap();
    assert_ne!(two.node, three.node);
    assert!(!two.varargs);

    let sum = registry
        .invoke(three.node, &[json!(1), json!(2), json!(3)])
        .unwrap();
    assert_eq!(sum.to_json(), json!(6.0));
}

#[test]
fn vararg_fallback() {
    let registry = build(&mixer());
    use ParamKind::String as Str;
    let resolved = registry.resolve("mixer.join", &[Str, Str, Str]).unwrap();
    assert!(resolved.varargs);
    assert_eq!(
        Some(resolved.node),
        registry
            .resolve("mixer.join", &[ParamKind::StringArray])
            .map(|r| r.node)
    );
    assert!(registry.resolve("mixer.join", &[Str, ParamKind::Number]).is_none());
}

#[test]
fn chain_invocation_splits_arguments() {
    let host = mixer();
    let mut registry = build(&host);
    let node = registry
        .resolve("mixer.trackBank.getItemAt.setName", &[ParamKind::Number, ParamKind::String])
        .unwrap()
        .node;
    let result = registry.invoke(node, &[json!(1), json!("Drums")]).unwrap();
    assert_matches!(result, HostValue::Void);
    assert_eq!(host.tracks.items[1].name.current(), json!("Drums"));
}

#[test]
fn bank_index_results_are_cached() {
    let host = mixer();
    let mut registry = build(&host);
    let node = registry
        .resolve("mixer.trackBank.getItemAt.volume", &[ParamKind::Number])
        .unwrap()
        .node;
    assert!(registry.node(node).is_cacheable());

    let first = registry.invoke(node, &[json!(0)]).unwrap();
    let lookups = host.tracks.lookups.load(Ordering::SeqCst);
    let second = registry.invoke(node, &[json!(0)]).unwrap();
    assert_eq!(host.tracks.lookups.load(Ordering::SeqCst), lookups);

    let (HostValue::Observable(a), HostValue::Observable(b)) = (first, second) else {
        panic!("expected observables");
    };
    assert!(Arc::ptr_eq(&a, &b));

    registry.clear();
    assert_eq!(registry.node(node).cached_len(), 0);
    let _ = registry.invoke(node, &[json!(0)]).unwrap();
    assert!(host.tracks.lookups.load(Ordering::SeqCst) > lookups);
}

#[test]
fn host_errors_do_not_poison_the_node() {
    let host = mixer();
    let mut registry = build(&host);
    let node = registry.resolve("mixer.flaky", &[]).unwrap().node;

    assert_matches!(registry.invoke(node, &[]), Err(InvokeError::Host(m)) if m == "device gone");
    assert_matches!(registry.invoke(node, &[]), Err(InvokeError::Host(m)) if m == "device gone");
    assert_eq!(host.flaky_calls.load(Ordering::SeqCst), 2);
    assert!(registry.node(node).error().is_none());
}

#[test]
fn bad_bank_index_leaves_the_chain_usable() {
    let mut registry = build(&mixer());
    let node = registry
        .resolve("mixer.trackBank.getItemAt.volume", &[ParamKind::Number])
        .unwrap()
        .node;

    assert_matches!(
        registry.invoke(node, &[json!(99)]),
        Err(InvokeError::Host(m)) if m == "index out of range"
    );
    let value = registry.invoke(node, &[json!(1)]).unwrap();
    assert_eq!(value.to_json(), json!(0.75));
    let accessor = registry.node(node).parent().unwrap();
    assert!(registry.node(accessor).error().is_none());
}

#[test]
fn arity_mismatch_is_not_sticky() {
    let mut registry = build(&mixer());
    let node = registry
        .resolve("mixer.add", &[ParamKind::Number, ParamKind::Number])
        .unwrap()
        .node;
    assert_matches!(registry.invoke(node, &[json!(1)]), Err(InvokeError::Arity { .. }));
    assert!(registry.invoke(node, &[json!(1), json!(2)]).is_ok());
}

// ── Events ──────────────────────────────────────────────────────────

#[test]
fn host_push_reaches_change_sink() {
    let host = mixer();
    let changes: Arc<Mutex<Vec<ValueChange>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_changes = changes.clone();
    let mut registry = RegistryBuilder::new(catalog())
        .module(module(&host))
        .change_sink(Arc::new(move |change: ValueChange| sink_changes.lock().push(change)))
        .build()
        .unwrap();

    let client = ClientId::from("a");
    let _ = registry
        .subscribe("mixer.trackBank.getItemAt.sendBank.getItemAt.value", &client)
        .unwrap();
    host.tracks.items[1].sends.items[2].value.set(json!(0.9));

    let change = changes.lock().pop().unwrap();
    let (payload, targets) = registry.on_value_changed(change).unwrap();
    assert_eq!(payload.params, vec![json!(1), json!(2), json!(0.9)]);
    assert_eq!(targets, vec![client]);
}

#[test]
fn two_clients_each_get_one_replay_and_release_once() {
    let host = mixer();
    let mut registry = build(&host);
    let (a, b) = (ClientId::from("a"), ClientId::from("b"));

    let first = registry.subscribe("mixer.isPlaying", &a).unwrap();
    let second = registry.subscribe("mixer.isPlaying", &b).unwrap();
    assert_eq!(first.replays.len(), 1);
    assert!(first.immediate.is_empty());
    assert!(second.replays.is_empty());
    assert_eq!(second.immediate.len(), 1);

    let replayed = registry.replay(&first.replays[0]).unwrap();
    assert_eq!(replayed.params, vec![json!(false)]);

    registry.unsubscribe("mixer.isPlaying", &a).unwrap();
    registry.unsubscribe("mixer.isPlaying", &b).unwrap();
    assert_eq!(host.playing.subscribe_calls(), 1);
    assert_eq!(host.playing.unsubscribe_calls(), 1);
    assert!(!host.playing.is_subscribed());
}

#[test]
fn disconnect_releases_subscriptions() {
    let host = mixer();
    let mut registry = build(&host);
    let a = ClientId::from("a");
    let _ = registry.subscribe("mixer.isPlaying", &a).unwrap();
    let _ = registry.subscribe("mixer.trackBank.getItemAt.name", &a).unwrap();

    registry.disconnect(&a);
    assert!(!host.playing.is_subscribed());
    assert!(!host.tracks.items[0].name.is_subscribed());
}

#[test]
fn unknown_event() {
    let mut registry = build(&mixer());
    assert_matches!(
        registry.subscribe("mixer.nothing", &ClientId::from("a")),
        Err(InvokeError::EventNotFound(_))
    );
}
