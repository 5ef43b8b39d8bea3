//! Core data model shared by the path utility, plugin framework, session
//! engine and collector. These types are transport-agnostic: conversions
//! to and from the `tonic`/`prost`-generated `gnmi` wire types live in
//! [`crate::gnmi`].

use std::collections::HashMap;

/// One element of a gNMI path: a name plus zero or more key/value pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathElem {
    pub name: String,
    pub keys: HashMap<String, String>,
}

/// An immutable, ordered gNMI path. Built once by [`crate::path::xpath_to_gnmi`]
/// or derived from a wire `Notification`, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub elements: Vec<PathElem>,
    pub origin: String,
    pub target: Option<String>,
}

impl Path {
    /// Concatenation of every element's bare name, in order, with no
    /// separators or key information. Used by the openconfig-interfaces
    /// plugin to match full-path-string skeletons such as
    /// `"interfacesinterfacestatename"`.
    pub fn name_concat(&self) -> String {
        self.elements.iter().map(|e| e.name.as_str()).collect()
    }
}

/// What one plugin wants the session to subscribe to.
#[derive(Debug, Clone)]
pub struct PathsDescriptor {
    pub xpath_list: Vec<String>,
    pub datamodels: Vec<String>,
    pub origin: String,
    pub target: String,
}

/// A scalar value carried by a gNMI `Update`. Mirrors the wire
/// `gnmi::typed_value::Value` oneof, trimmed to the variants the
/// openconfig-interfaces plugin discriminates between (string labels,
/// integer counters) plus the remaining scalar kinds for completeness.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    String(String),
    Int(i64),
    Uint(u64),
    Bool(bool),
    Bytes(Vec<u8>),
    Float(f32),
    Double(f64),
    JsonIetf(Vec<u8>),
    Json(Vec<u8>),
    Ascii(String),
}

impl TypedValue {
    /// Best-effort coercion to an integer, used when populating counter
    /// table entries. Returns `None` for values with no sensible integer
    /// reading; callers substitute the `"not_available"` sentinel.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TypedValue::Int(v) => Some(*v),
            TypedValue::Uint(v) => i64::try_from(*v).ok(),
            TypedValue::String(s) | TypedValue::Ascii(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Best-effort coercion to a display string, used when populating label
    /// table entries.
    pub fn as_string(&self) -> String {
        match self {
            TypedValue::String(s) | TypedValue::Ascii(s) => s.clone(),
            TypedValue::Int(v) => v.to_string(),
            TypedValue::Uint(v) => v.to_string(),
            TypedValue::Bool(v) => v.to_string(),
            TypedValue::Float(v) => v.to_string(),
            TypedValue::Double(v) => v.to_string(),
            TypedValue::Bytes(b) | TypedValue::JsonIetf(b) | TypedValue::Json(b) => {
                String::from_utf8_lossy(b).into_owned()
            }
        }
    }
}

/// A decoded `SubscribeResponse` carrying an update. Deletes and sync are
/// modeled as sibling fields rather than a further sum type, matching the
/// gNMI wire message shape.
#[derive(Debug, Clone)]
pub struct Notification {
    pub timestamp: i64,
    pub atomic: bool,
    pub prefix: Path,
    pub updates: Vec<NotificationUpdate>,
    pub deletes: Vec<Path>,
}

#[derive(Debug, Clone)]
pub struct NotificationUpdate {
    pub path: Path,
    pub value: Option<TypedValue>,
    pub duplicates: u32,
}

/// A notification flattened into the plugin-internal shape: the prefix
/// path concatenated with the per-update path, keys preserved positionally.
#[derive(Debug, Clone)]
pub struct GnmiUpdate {
    pub timestamp: i64,
    pub atomic: bool,
    pub path: Vec<String>,
    pub path_keys: Vec<HashMap<String, String>>,
    pub value: Option<TypedValue>,
    pub duplicates: u32,
}

#[derive(Debug, Clone)]
pub struct GnmiDelete {
    pub timestamp: i64,
    pub atomic: bool,
    pub path: Vec<String>,
    pub path_keys: Vec<HashMap<String, String>>,
}

impl GnmiUpdate {
    /// Concatenation of bare path names with no separators, mirroring
    /// [`Path::name_concat`] for the flattened representation.
    pub fn name_concat(&self) -> String {
        self.path.concat()
    }
}

/// One rendered time series point.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub label_values: Vec<String>,
    pub value: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Unknown,
    Counter,
    Gauge,
}

/// One metric family: a name, a kind, a label schema and the series
/// collected under it.
#[derive(Debug, Clone)]
pub struct MetricBundle {
    pub kind: MetricKind,
    pub device_name: String,
    pub metric_name: String,
    pub documentation: String,
    pub label_set: Vec<String>,
    pub metrics: Vec<Metric>,
}

impl MetricBundle {
    /// `kind != UNKNOWN`, name fields non-empty, and every metric's
    /// label_values length matches label_set length.
    pub fn is_valid(&self) -> bool {
        self.kind != MetricKind::Unknown
            && !self.device_name.is_empty()
            && !self.metric_name.is_empty()
            && self
                .metrics
                .iter()
                .all(|m| m.label_values.len() == self.label_set.len())
    }
}

/// Per-device session configuration, after template inheritance and
/// defaulting has been applied by the config loader.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub dev_name: String,
    pub ip: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub plugins: Vec<String>,
    pub scrape_interval_s: u64,
    pub oversampling: u64,
    pub wd_multiplier: u64,
    pub force_encoding: Option<String>,
    pub bypass_msg_routing: bool,
}

impl SessionConfig {
    pub fn sample_interval_ns(&self) -> u64 {
        self.scrape_interval_s * 1_000_000_000 / self.oversampling.max(1)
    }

    pub fn watchdog_timeout_s(&self) -> u64 {
        self.scrape_interval_s * self.wd_multiplier
    }
}

pub const NOT_AVAILABLE: &str = "not_available";
