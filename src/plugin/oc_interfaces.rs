//! Concrete [`super::Plugin`] for the `openconfig-interfaces` YANG model.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::model::{GnmiUpdate, Metric, MetricBundle, MetricKind, Notification, PathsDescriptor, NOT_AVAILABLE};

use super::{Plugin, PluginBuffer};

const PATH_IFACE_STATE: &str = "/interfaces/interface/state";
const PATH_SUBIFACE_STATE: &str = "/interfaces/interface/subinterfaces/subinterface/state";

/// `instance-name, data-model, device` prepended to every label set, with
/// hyphens converted to underscores at emission time.
const PLUGIN_LABELS: [&str; 3] = ["instance-name", "data-model", "device"];

const IFACE_LABELS: [&str; 6] = [
    "name",
    "mtu",
    "description",
    "ifindex",
    "admin-status",
    "oper-status",
];

const SUBIFACE_LABELS: [&str; 7] = [
    "name",
    "index",
    "mtu",
    "description",
    "ifindex",
    "admin-status",
    "oper-status",
];

const SUBIFACE_METRICS: [&str; 19] = [
    "in-octets",
    "in-pkts",
    "in-unicast-pkts",
    "in-broadcast-pkts",
    "in-multicast-pkts",
    "in-errors",
    "in-discards",
    "out-octets",
    "out-pkts",
    "out-unicast-pkts",
    "out-broadcast-pkts",
    "out-multicast-pkts",
    "out-discards",
    "out-errors",
    "last-clear",
    "last-change",
    "in-unknown-protos",
    "in-fcs-errors",
    "carrier-transitions",
];

const IFACE_EXTRA_METRICS: [&str; 1] = ["resets"];

#[derive(Clone, Debug, PartialEq)]
enum Entry {
    Label(String),
    Metric(i64),
}

#[derive(Default)]
struct Tables {
    interfaces: HashMap<String, HashMap<String, Entry>>,
    subinterfaces: HashMap<String, HashMap<String, Entry>>,
}

pub struct OcInterfaces {
    buffer: PluginBuffer,
    dev_name: String,
    instance_name: String,
    metric_prefix: String,
    tables: Mutex<Tables>,
}

impl OcInterfaces {
    pub fn new(dev_name: &str, instance_name: &str, metric_prefix: &str) -> Self {
        Self {
            buffer: PluginBuffer::default(),
            dev_name: dev_name.to_string(),
            instance_name: instance_name.to_string(),
            metric_prefix: metric_prefix.to_string(),
            tables: Mutex::new(Tables::default()),
        }
    }

    fn clear_all_tables(&self) {
        let mut t = self.tables.lock().unwrap();
        t.interfaces.clear();
        t.subinterfaces.clear();
    }

    /// Scans updates for the `.../state/name` trigger leaf and instantiates
    /// empty skeletons (all labels `""`, all metrics `0`) for any interface
    /// or subinterface not already known.
    fn build_tables(&self, updates: &[GnmiUpdate]) {
        let mut t = self.tables.lock().unwrap();
        for u in updates {
            let concat = u.name_concat();
            if concat == "interfacesinterfacestatename" {
                let Some(name) = u.path_keys.get(1).and_then(|k| k.get("name")) else {
                    continue;
                };
                t.interfaces
                    .entry(name.clone())
                    .or_insert_with(|| skeleton(&IFACE_LABELS, &all_iface_metrics()));
            } else if concat == "interfacesinterfacesubinterfacessubinterfacestatename" {
                let Some(parent) = u.path_keys.get(1).and_then(|k| k.get("name")) else {
                    continue;
                };
                let Some(index) = u.path_keys.get(3).and_then(|k| k.get("index")) else {
                    continue;
                };
                let key = format!("{parent}.{index}");
                t.subinterfaces
                    .entry(key)
                    .or_insert_with(|| skeleton(&SUBIFACE_LABELS, &SUBIFACE_METRICS));
            }
        }
    }

    /// For each update under an interface or subinterface `state` subtree,
    /// writes the leaf's value into the matching label or metric slot.
    /// Unknown leaves are skipped. The subinterface `name` label is always
    /// overridden with the parent interface's name (ambiguous in the
    /// source; preserved as-is).
    fn update_tables(&self, updates: &[GnmiUpdate]) {
        let mut t = self.tables.lock().unwrap();
        for u in updates {
            let concat = u.name_concat();
            if concat.starts_with("interfacesinterfacestate") {
                let Some(iface_name) = u.path_keys.get(1).and_then(|k| k.get("name")) else {
                    continue;
                };
                let Some(entry) = t.interfaces.get_mut(iface_name) else {
                    continue;
                };
                let leaf = u.path.last().unwrap().as_str();
                write_leaf(entry, leaf, u);
            } else if concat.starts_with("interfacesinterfacesubinterfacessubinterfacestate") {
                let Some(parent) = u.path_keys.get(1).and_then(|k| k.get("name")) else {
                    continue;
                };
                let Some(index) = u.path_keys.get(3).and_then(|k| k.get("index")) else {
                    continue;
                };
                let key = format!("{parent}.{index}");
                let Some(entry) = t.subinterfaces.get_mut(&key) else {
                    continue;
                };
                let leaf = u.path.last().unwrap().as_str();
                if leaf == "name" {
                    entry.insert("name".to_string(), Entry::Label(parent.clone()));
                } else {
                    write_leaf(entry, leaf, u);
                }
            }
        }
    }

    fn build_metrics_and_bundles(&self) -> Vec<MetricBundle> {
        let t = self.tables.lock().unwrap();
        let now = chrono::Utc::now().timestamp();
        let mut by_metric: HashMap<String, MetricBundle> = HashMap::new();

        for table in t.interfaces.values() {
            let labelset = label_set(&IFACE_LABELS);
            for metric in all_iface_metrics() {
                self.accumulate(
                    &mut by_metric,
                    "iface",
                    metric,
                    &labelset,
                    &IFACE_LABELS,
                    table,
                    now,
                );
            }
        }

        for table in t.subinterfaces.values() {
            let labelset = label_set(&SUBIFACE_LABELS);
            for metric in SUBIFACE_METRICS {
                self.accumulate(
                    &mut by_metric,
                    "subiface",
                    metric,
                    &labelset,
                    &SUBIFACE_LABELS,
                    table,
                    now,
                );
            }
        }

        by_metric.into_values().collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn accumulate(
        &self,
        by_metric: &mut HashMap<String, MetricBundle>,
        infix: &str,
        metric: &str,
        label_names: &[String],
        label_keys: &[&str],
        table: &HashMap<String, Entry>,
        now: i64,
    ) {
        let bundle_name = format!(
            "{}_{}_{}",
            self.metric_prefix,
            infix,
            metric.replace('-', "_")
        );
        let value = match table.get(metric) {
            Some(Entry::Metric(v)) => *v,
            _ => 0,
        };
        let mut label_values = vec![
            self.instance_name.clone(),
            "openconfig-interfaces".to_string(),
            self.dev_name.clone(),
        ];
        for lk in label_keys {
            let v = match table.get(*lk) {
                Some(Entry::Label(s)) => s.clone(),
                Some(Entry::Metric(v)) => v.to_string(),
                None => NOT_AVAILABLE.to_string(),
            };
            label_values.push(v);
        }

        let mut full_label_set = label_set(&PLUGIN_LABELS);
        full_label_set.extend(label_names.iter().cloned());

        let bundle = by_metric.entry(bundle_name.clone()).or_insert_with(|| MetricBundle {
            kind: MetricKind::Counter,
            device_name: self.dev_name.clone(),
            metric_name: bundle_name,
            documentation: format!("{infix} {metric}"),
            label_set: full_label_set,
            metrics: Vec::new(),
        });
        bundle.metrics.push(Metric {
            label_values,
            value,
            timestamp: now,
        });
    }
}

fn all_iface_metrics() -> Vec<&'static str> {
    SUBIFACE_METRICS
        .iter()
        .copied()
        .chain(IFACE_EXTRA_METRICS.iter().copied())
        .collect()
}

fn skeleton(labels: &[&str], metrics: &[&str]) -> HashMap<String, Entry> {
    let mut m = HashMap::new();
    for l in labels {
        m.insert(l.to_string(), Entry::Label(String::new()));
    }
    for metric in metrics {
        m.insert(metric.to_string(), Entry::Metric(0));
    }
    m
}

fn label_set(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|l| l.replace('-', "_")).collect()
}

fn write_leaf(entry: &mut HashMap<String, Entry>, leaf: &str, u: &GnmiUpdate) {
    if IFACE_LABELS.contains(&leaf) || SUBIFACE_LABELS.contains(&leaf) {
        let v = u
            .value
            .as_ref()
            .map(|v| v.as_string())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        entry.insert(leaf.to_string(), Entry::Label(v));
    } else if SUBIFACE_METRICS.contains(&leaf) || IFACE_EXTRA_METRICS.contains(&leaf) {
        match u.value.as_ref().and_then(|v| v.as_i64()) {
            Some(v) => {
                entry.insert(leaf.to_string(), Entry::Metric(v));
            }
            None => {
                tracing::debug!(leaf, "malformed counter update, skipping");
            }
        }
    } else {
        tracing::debug!(leaf, "unknown leaf under interface state, skipping");
    }
}

#[async_trait::async_trait]
impl Plugin for OcInterfaces {
    fn name(&self) -> &str {
        "openconfig-interfaces"
    }

    fn get_paths(&self) -> PathsDescriptor {
        PathsDescriptor {
            xpath_list: vec![PATH_IFACE_STATE.to_string(), PATH_SUBIFACE_STATE.to_string()],
            datamodels: vec!["openconfig-interfaces".to_string()],
            origin: "openconfig".to_string(),
            target: "oc_interfaces".to_string(),
        }
    }

    fn gnmi_notification_handler(&self, notification: Notification) {
        self.buffer.push(notification);
    }

    fn set_sync_status(&self, on_sync: bool) {
        self.buffer.set_sync_status(on_sync);
    }

    async fn fetch_metric_bundles(&self) -> Vec<MetricBundle> {
        self.clear_all_tables();
        let (updates, _deletes) = self.buffer.checkout();
        if updates.is_empty() {
            return Vec::new();
        }
        self.build_tables(&updates);
        self.update_tables(&updates);
        self.build_metrics_and_bundles()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotificationUpdate, Path, PathElem, TypedValue};
    use std::collections::HashMap as Map;

    fn key(k: &str, v: &str) -> Map<String, String> {
        let mut m = Map::new();
        m.insert(k.to_string(), v.to_string());
        m
    }

    fn path(elems: Vec<(&str, Map<String, String>)>) -> Path {
        Path {
            elements: elems
                .into_iter()
                .map(|(n, k)| PathElem {
                    name: n.to_string(),
                    keys: k,
                })
                .collect(),
            origin: "openconfig".into(),
            target: Some("oc_interfaces".into()),
        }
    }

    fn leaf_update(parent_name: &str, leaf: &str, value: TypedValue) -> Notification {
        Notification {
            timestamp: 1,
            atomic: false,
            prefix: path(vec![
                ("interfaces", Map::new()),
                ("interface", key("name", parent_name)),
            ]),
            updates: vec![NotificationUpdate {
                path: path(vec![("state", Map::new()), (leaf, Map::new())]),
                value: Some(value),
                duplicates: 0,
            }],
            deletes: vec![],
        }
    }

    #[tokio::test]
    async fn renders_interface_label_and_metric() {
        let plugin = OcInterfaces::new("dev1", "inst1", "gnmi");
        plugin.set_sync_status(true);
        plugin.gnmi_notification_handler(leaf_update("eth0", "name", TypedValue::String("eth0".into())));
        plugin.gnmi_notification_handler(leaf_update(
            "eth0",
            "admin-status",
            TypedValue::String("UP".into()),
        ));
        plugin.gnmi_notification_handler(leaf_update("eth0", "in-octets", TypedValue::Int(42)));

        let bundles = plugin.fetch_metric_bundles().await;
        assert!(!bundles.is_empty());
        let in_octets = bundles
            .iter()
            .find(|b| b.metric_name == "gnmi_iface_in_octets")
            .expect("in_octets bundle present");
        assert!(in_octets.is_valid());
        assert_eq!(in_octets.metrics.len(), 1);
        assert_eq!(in_octets.metrics[0].value, 42);
    }

    /// Real gNMI framing nests traffic counters under `state/counters/<leaf>`
    /// (depth 5 once flattened), not directly under `state` (depth 4).
    fn counter_update(parent_name: &str, leaf: &str, value: TypedValue) -> Notification {
        Notification {
            timestamp: 1,
            atomic: false,
            prefix: path(vec![
                ("interfaces", Map::new()),
                ("interface", key("name", parent_name)),
            ]),
            updates: vec![NotificationUpdate {
                path: path(vec![("state", Map::new()), ("counters", Map::new()), (leaf, Map::new())]),
                value: Some(value),
                duplicates: 0,
            }],
            deletes: vec![],
        }
    }

    #[tokio::test]
    async fn renders_nested_counter_under_state_counters() {
        let plugin = OcInterfaces::new("dev1", "inst1", "gnmi");
        plugin.set_sync_status(true);
        plugin.gnmi_notification_handler(leaf_update("eth0", "name", TypedValue::String("eth0".into())));
        plugin.gnmi_notification_handler(counter_update("eth0", "in-octets", TypedValue::Int(99)));

        let bundles = plugin.fetch_metric_bundles().await;
        let in_octets = bundles
            .iter()
            .find(|b| b.metric_name == "gnmi_iface_in_octets")
            .expect("in_octets bundle present");
        assert_eq!(in_octets.metrics[0].value, 99);
    }

    #[tokio::test]
    async fn empty_buffer_yields_no_bundles() {
        let plugin = OcInterfaces::new("dev1", "inst1", "gnmi");
        plugin.set_sync_status(true);
        let bundles = plugin.fetch_metric_bundles().await;
        assert!(bundles.is_empty());
    }

    #[tokio::test]
    async fn not_synced_yields_no_bundles() {
        let plugin = OcInterfaces::new("dev1", "inst1", "gnmi");
        plugin.gnmi_notification_handler(leaf_update("eth0", "name", TypedValue::String("eth0".into())));
        let bundles = plugin.fetch_metric_bundles().await;
        assert!(bundles.is_empty());
    }
}
