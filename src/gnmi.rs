//! Generated gNMI wire types and the thin conversions between them and the
//! transport-agnostic [`crate::model`] shapes.

#![allow(clippy::all)]

pub mod proto {
    tonic::include_proto!("gnmi");
}

pub use proto::g_nmi_client::GNmiClient;
pub use proto::{
    subscribe_request, subscribe_response, typed_value, CapabilityRequest, CapabilityResponse,
    Encoding, ModelData, Path as ProtoPath, PathElem as ProtoPathElem, Subscription,
    SubscriptionList, SubscriptionMode, TypedValue as ProtoTypedValue,
};

use std::collections::HashMap;

use crate::model::{self, GnmiDelete, GnmiUpdate, NotificationUpdate, Path, PathElem, TypedValue};

/// Order in which a device's advertised encodings are tried when
/// `force_encoding` is unset or unsupported.
pub const PREFERRED_ENCODINGS: [Encoding; 4] = [
    Encoding::Proto,
    Encoding::Json,
    Encoding::JsonIetf,
    Encoding::Ascii,
];

pub fn encoding_from_name(name: &str) -> Option<Encoding> {
    match name.to_uppercase().as_str() {
        "JSON" => Some(Encoding::Json),
        "BYTES" => Some(Encoding::Bytes),
        "PROTO" => Some(Encoding::Proto),
        "ASCII" => Some(Encoding::Ascii),
        "JSON_IETF" => Some(Encoding::JsonIetf),
        _ => None,
    }
}

pub fn to_proto_path(path: &Path) -> ProtoPath {
    ProtoPath {
        origin: path.origin.clone(),
        target: path.target.clone().unwrap_or_default(),
        elem: path
            .elements
            .iter()
            .map(|e| ProtoPathElem {
                name: e.name.clone(),
                key: e.keys.clone(),
            })
            .collect(),
    }
}

pub fn from_proto_path(path: &ProtoPath) -> Path {
    Path {
        elements: path
            .elem
            .iter()
            .map(|e| PathElem {
                name: e.name.clone(),
                keys: e.key.clone(),
            })
            .collect(),
        origin: path.origin.clone(),
        target: if path.target.is_empty() {
            None
        } else {
            Some(path.target.clone())
        },
    }
}

pub fn from_proto_typed_value(val: &ProtoTypedValue) -> Option<TypedValue> {
    use typed_value::Value;
    val.value.as_ref().map(|v| match v {
        Value::StringVal(s) => TypedValue::String(s.clone()),
        Value::IntVal(i) => TypedValue::Int(*i),
        Value::UintVal(u) => TypedValue::Uint(*u),
        Value::BoolVal(b) => TypedValue::Bool(*b),
        Value::BytesVal(b) => TypedValue::Bytes(b.clone()),
        Value::FloatVal(f) => TypedValue::Float(*f),
        Value::DoubleVal(d) => TypedValue::Double(*d),
        Value::JsonIetfVal(b) => TypedValue::JsonIetf(b.clone()),
        Value::JsonVal(b) => TypedValue::Json(b.clone()),
        Value::AsciiVal(s) => TypedValue::Ascii(s.clone()),
        Value::DecimalVal(_) | Value::LeaflistVal(_) | Value::AnyVal(_) | Value::ProtoBytes(_) => {
            TypedValue::String(String::new())
        }
    })
}

/// Converts a wire `Notification` into this crate's internal shape.
pub fn from_proto_notification(n: &proto::Notification) -> model::Notification {
    let prefix = n
        .prefix
        .as_ref()
        .map(from_proto_path)
        .unwrap_or(Path {
            elements: Vec::new(),
            origin: String::new(),
            target: None,
        });
    model::Notification {
        timestamp: n.timestamp,
        atomic: n.atomic,
        prefix,
        updates: n
            .update
            .iter()
            .map(|u| NotificationUpdate {
                path: u.path.as_ref().map(from_proto_path).unwrap_or(Path {
                    elements: Vec::new(),
                    origin: String::new(),
                    target: None,
                }),
                value: u.val.as_ref().and_then(from_proto_typed_value),
                duplicates: u.duplicates,
            })
            .collect(),
        deletes: n.delete.iter().map(from_proto_path).collect(),
    }
}

/// Flattens a notification into `GnmiUpdate`/`GnmiDelete` messages,
/// concatenating the prefix path elements with each update's own path
/// elements (keys preserved positionally), per §4.2 step 1.
pub fn flatten(n: &model::Notification) -> (Vec<GnmiUpdate>, Vec<GnmiDelete>) {
    let mut updates = Vec::with_capacity(n.updates.len());
    for u in &n.updates {
        let mut path: Vec<String> = Vec::new();
        let mut path_keys: Vec<HashMap<String, String>> = Vec::new();
        for e in n.prefix.elements.iter().chain(u.path.elements.iter()) {
            path.push(e.name.clone());
            path_keys.push(e.keys.clone());
        }
        updates.push(GnmiUpdate {
            timestamp: n.timestamp,
            atomic: n.atomic,
            path,
            path_keys,
            value: u.value.clone(),
            duplicates: u.duplicates,
        });
    }

    let mut deletes = Vec::with_capacity(n.deletes.len());
    for d in &n.deletes {
        let mut path: Vec<String> = Vec::new();
        let mut path_keys: Vec<HashMap<String, String>> = Vec::new();
        for e in n.prefix.elements.iter().chain(d.elements.iter()) {
            path.push(e.name.clone());
            path_keys.push(e.keys.clone());
        }
        deletes.push(GnmiDelete {
            timestamp: n.timestamp,
            atomic: n.atomic,
            path,
            path_keys,
        });
    }

    (updates, deletes)
}
