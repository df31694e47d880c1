//! In-memory host graph served by the binary.
//!
//! Modules:
//! - `transport`: play state and tempo
//! - `mainTrackBank`: tracks with name, volume, mute and a bank of sends
//! - `sceneBank`: named scenes; launching one starts the transport
//! - `application`: the list of open projects
//!
//! Setters update an [`ObservableCell`], which pushes to the registry only
//! while a client is subscribed.

use std::sync::Arc;

use hostrpc_registry::{
    HostError, HostObject, HostValue, MethodSchema, ModuleSpec, ObservableCell, ObservableValue,
    ParamKind,
    SchemaCatalog, TypeSchema,
};
use hostrpc_settings::HostSettings;
use serde_json::{Value, json};

const BOOLEAN_VALUE: &str = "BooleanValue";
const NUMBER_VALUE: &str = "NumberValue";
const STRING_VALUE: &str = "StringValue";
const STRING_ARRAY_VALUE: &str = "StringArrayValue";

const MIN_TEMPO: f64 = 20.0;
const MAX_TEMPO: f64 = 666.0;

fn number(value: &Value) -> Result<f64, HostError> {
    value
        .as_f64()
        .ok_or_else(|| HostError::new(format!("expected a number, got {value}")))
}

fn boolean(value: &Value) -> Result<bool, HostError> {
    value
        .as_bool()
        .ok_or_else(|| HostError::new(format!("expected a boolean, got {value}")))
}

fn string(value: &Value) -> Result<&str, HostError> {
    value
        .as_str()
        .ok_or_else(|| HostError::new(format!("expected a string, got {value}")))
}

fn observable(cell: &Arc<ObservableCell>) -> HostValue {
    HostValue::Observable(cell.clone())
}

// ── Transport ───────────────────────────────────────────────────────

/// Play state and tempo.
pub struct Transport {
    playing: Arc<ObservableCell>,
    tempo: Arc<ObservableCell>,
}

impl Transport {
    fn new() -> Self {
        Self {
            playing: Arc::new(ObservableCell::new(json!(false))),
            tempo: Arc::new(ObservableCell::new(json!(120.0))),
        }
    }

    /// Whether the transport is running.
    pub fn is_playing(&self) -> bool {
        self.playing.current().as_bool().unwrap_or(false)
    }
}

impl HostObject for Transport {
    fn invoke(&self, method: &str, args: &[Value]) -> Result<HostValue, HostError> {
        match (method, args) {
            ("isPlaying", []) => Ok(observable(&self.playing)),
            ("tempo", []) => Ok(observable(&self.tempo)),
            ("play", []) => {
                self.playing.set(json!(true));
                Ok(HostValue::Void)
            }
            ("stop", []) => {
                self.playing.set(json!(false));
                Ok(HostValue::Void)
            }
            ("setTempo", [bpm]) => {
                self.tempo.set(json!(number(bpm)?.clamp(MIN_TEMPO, MAX_TEMPO)));
                Ok(HostValue::Void)
            }
            _ => Err(HostError::unknown_method(method, args.len())),
        }
    }
}

// ── Banks ───────────────────────────────────────────────────────────

/// Fixed-size bank whose items come from `getItemAt(index)`.
struct Bank<T> {
    items: Vec<Arc<T>>,
}

impl<T: HostObject + 'static> HostObject for Bank<T> {
    fn invoke(&self, method: &str, args: &[Value]) -> Result<HostValue, HostError> {
        match (method, args) {
            ("getItemAt", [index]) => {
                let item = index
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .and_then(|i| self.items.get(i))
                    .ok_or_else(|| {
                        HostError::new(format!(
                            "index {index} out of range 0..{}",
                            self.items.len()
                        ))
                    })?;
                let object: Arc<dyn HostObject> = item.clone();
                Ok(HostValue::Object(object))
            }
            _ => Err(HostError::unknown_method(method, args.len())),
        }
    }
}

/// One send of a track.
struct SendSlot {
    value: Arc<ObservableCell>,
}

impl HostObject for SendSlot {
    fn invoke(&self, method: &str, args: &[Value]) -> Result<HostValue, HostError> {
        match (method, args) {
            ("value", []) => Ok(observable(&self.value)),
            ("set", [level]) => {
                self.value.set(json!(number(level)?.clamp(0.0, 1.0)));
                Ok(HostValue::Void)
            }
            _ => Err(HostError::unknown_method(method, args.len())),
        }
    }
}

struct Track {
    name: Arc<ObservableCell>,
    volume: Arc<ObservableCell>,
    mute: Arc<ObservableCell>,
    sends: Arc<Bank<SendSlot>>,
}

impl HostObject for Track {
    fn invoke(&self, method: &str, args: &[Value]) -> Result<HostValue, HostError> {
        match (method, args) {
            ("name", []) => Ok(observable(&self.name)),
            ("volume", []) => Ok(observable(&self.volume)),
            ("mute", []) => Ok(observable(&self.mute)),
            ("sendBank", []) => Ok(HostValue::Object(self.sends.clone())),
            ("setName", [name]) => {
                self.name.set(json!(string(name)?));
                Ok(HostValue::Void)
            }
            ("setVolume", [level]) => {
                self.volume.set(json!(number(level)?.clamp(0.0, 1.0)));
                Ok(HostValue::Void)
            }
            ("setMute", [muted]) => {
                self.mute.set(json!(boolean(muted)?));
                Ok(HostValue::Void)
            }
            _ => Err(HostError::unknown_method(method, args.len())),
        }
    }
}

struct Scene {
    name: Arc<ObservableCell>,
    transport: Arc<Transport>,
}

impl HostObject for Scene {
    fn invoke(&self, method: &str, args: &[Value]) -> Result<HostValue, HostError> {
        match (method, args) {
            ("name", []) => Ok(observable(&self.name)),
            ("setName", [name]) => {
                self.name.set(json!(string(name)?));
                Ok(HostValue::Void)
            }
            ("launch", []) => self.transport.invoke("play", &[]),
            _ => Err(HostError::unknown_method(method, args.len())),
        }
    }
}

// ── Application ─────────────────────────────────────────────────────

struct Application {
    projects: Arc<ObservableCell>,
}

impl HostObject for Application {
    fn invoke(&self, method: &str, args: &[Value]) -> Result<HostValue, HostError> {
        match (method, args) {
            ("projectNames", []) => Ok(observable(&self.projects)),
            ("openProject", [name]) => {
                let name = string(name)?;
                let mut names = self.projects.current();
                if let Some(list) = names.as_array_mut() {
                    list.push(json!(name));
                }
                self.projects.set(names);
                Ok(HostValue::Void)
            }
            _ => Err(HostError::unknown_method(method, args.len())),
        }
    }
}

// ── Host ────────────────────────────────────────────────────────────

/// The simulated host and its module roots.
pub struct SimulatedHost {
    sizes: HostSettings,
    transport: Arc<Transport>,
    tracks: Arc<Bank<Track>>,
    scenes: Arc<Bank<Scene>>,
    application: Arc<Application>,
}

impl SimulatedHost {
    /// Build a host with the configured bank sizes.
    pub fn new(sizes: &HostSettings) -> Self {
        let transport = Arc::new(Transport::new());
        let tracks = (0..sizes.track_count)
            .map(|i| {
                Arc::new(Track {
                    name: Arc::new(ObservableCell::new(json!(format!("Track {}", i + 1)))),
                    volume: Arc::new(ObservableCell::new(json!(0.8))),
                    mute: Arc::new(ObservableCell::new(json!(false))),
                    sends: Arc::new(Bank {
                        items: (0..sizes.send_count)
                            .map(|_| {
                                Arc::new(SendSlot {
                                    value: Arc::new(ObservableCell::new(json!(0.0))),
                                })
                            })
                            .collect(),
                    }),
                })
            })
            .collect();
        let scenes = (0..sizes.scene_count)
            .map(|i| {
                Arc::new(Scene {
                    name: Arc::new(ObservableCell::new(json!(format!("Scene {}", i + 1)))),
                    transport: transport.clone(),
                })
            })
            .collect();
        Self {
            sizes: sizes.clone(),
            transport,
            tracks: Arc::new(Bank { items: tracks }),
            scenes: Arc::new(Bank { items: scenes }),
            application: Arc::new(Application {
                projects: Arc::new(ObservableCell::collection(json!(["Untitled"]))),
            }),
        }
    }

    /// The transport.
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Type descriptors of every host type.
    pub fn catalog() -> SchemaCatalog {
        use ParamKind::{Boolean, Number, String as Str, StringArray};

        SchemaCatalog::new()
            .with(TypeSchema::observable(BOOLEAN_VALUE, Boolean))
            .with(TypeSchema::observable(NUMBER_VALUE, Number))
            .with(TypeSchema::observable(STRING_VALUE, Str))
            .with(TypeSchema::observable(STRING_ARRAY_VALUE, StringArray))
            .with(
                TypeSchema::object("Transport")
                    .method(MethodSchema::new("isPlaying").returns_type(BOOLEAN_VALUE))
                    .method(MethodSchema::new("tempo").returns_type(NUMBER_VALUE))
                    .method(MethodSchema::new("play"))
                    .method(MethodSchema::new("stop"))
                    .method(MethodSchema::new("setTempo").params([Number])),
            )
            .with(
                TypeSchema::bank("TrackBank", "Track")
                    .method(MethodSchema::new("getItemAt").bank_item().returns_type("Track")),
            )
            .with(
                TypeSchema::object("Track")
                    .method(MethodSchema::new("name").returns_type(STRING_VALUE))
                    .method(MethodSchema::new("volume").returns_type(NUMBER_VALUE))
                    .method(MethodSchema::new("mute").returns_type(BOOLEAN_VALUE))
                    .method(MethodSchema::new("sendBank").returns_type("SendBank"))
                    .method(MethodSchema::new("setName").params([Str]))
                    .method(MethodSchema::new("setVolume").params([Number]))
                    .method(MethodSchema::new("setMute").params([Boolean])),
            )
            .with(
                TypeSchema::bank("SendBank", "Send")
                    .method(MethodSchema::new("getItemAt").bank_item().returns_type("Send")),
            )
            .with(
                TypeSchema::object("Send")
                    .method(MethodSchema::new("value").returns_type(NUMBER_VALUE))
                    .method(MethodSchema::new("set").params([Number])),
            )
            .with(
                TypeSchema::bank("SceneBank", "Scene")
                    .method(MethodSchema::new("getItemAt").bank_item().returns_type("Scene")),
            )
            .with(
                TypeSchema::object("Scene")
                    .method(MethodSchema::new("name").returns_type(STRING_VALUE))
                    .method(MethodSchema::new("setName").params([Str]))
                    .method(MethodSchema::new("launch")),
            )
            .with(
                TypeSchema::object("Application")
                    .method(MethodSchema::new("projectNames").returns_type(STRING_ARRAY_VALUE))
                    .method(MethodSchema::new("openProject").params([Str])),
            )
    }

    /// Module roots with their bank sizes.
    pub fn modules(&self) -> Vec<ModuleSpec> {
        vec![
            ModuleSpec::new("transport", "Transport", self.transport.clone()),
            ModuleSpec::new("mainTrackBank", "TrackBank", self.tracks.clone())
                .with_bank_size("TrackBank", self.sizes.track_count)
                .with_bank_size("SendBank", self.sizes.send_count),
            ModuleSpec::new("sceneBank", "SceneBank", self.scenes.clone())
                .with_bank_size("SceneBank", self.sizes.scene_count),
            ModuleSpec::new("application", "Application", self.application.clone()),
        ]
    }
}
