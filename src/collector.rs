//! C4: scrape-driven collector. Fans out to every registered plugin on
//! each scrape, merges bundles by metric name, and renders the Prometheus
//! text exposition format.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::model::{MetricBundle, MetricKind};
use crate::plugin::Plugin;

pub struct Collector {
    plugins: Mutex<Vec<Arc<dyn Plugin>>>,
    instance_name: String,
    metric_prefix: String,
    configured_devices: usize,
}

impl Collector {
    pub fn new(instance_name: String, metric_prefix: String, configured_devices: usize) -> Self {
        Self {
            plugins: Mutex::new(Vec::new()),
            instance_name,
            metric_prefix,
            configured_devices,
        }
    }

    /// Plugins self-register here at construction (§4.2 "Registration").
    /// The collector holds the reference until `unregister_all`; it never
    /// controls the plugin's lifetime beyond that `Arc`.
    pub async fn register_plugin(&self, plugin: Arc<dyn Plugin>) {
        self.plugins.lock().await.push(plugin);
    }

    pub async fn unregister_all(&self) {
        self.plugins.lock().await.clear();
    }

    /// Runs one scrape: fan out, merge, self-statistics, render, clear.
    /// The plugin-list mutex is acquired only to snapshot the Vec and is
    /// released before the (possibly slow) join.
    pub async fn collect(&self) -> String {
        let snapshot: Vec<Arc<dyn Plugin>> = {
            let guard = self.plugins.lock().await;
            guard.clone()
        };

        let renders = futures::future::join_all(
            snapshot.iter().map(|p| p.fetch_metric_bundles()),
        )
        .await;

        let mut table: HashMap<String, MetricBundle> = HashMap::new();
        let mut collected_plugins = 0usize;
        // Reassigned per plugin rather than accumulated across plugins,
        // matching an ambiguity preserved from the original: only the
        // last contributing plugin's device set ends up reported.
        let mut collected_devices: HashSet<String> = HashSet::new();

        for render in &renders {
            if render.is_empty() {
                continue;
            }
            if !render[0].is_valid() {
                continue;
            }
            collected_plugins += 1;
            collected_devices = render.iter().map(|b| b.device_name.clone()).collect();

            for bundle in render {
                table
                    .entry(bundle.metric_name.clone())
                    .and_modify(|existing| existing.metrics.extend(bundle.metrics.clone()))
                    .or_insert_with(|| bundle.clone());
            }
        }

        let collected_metrics = table.len() + 1;
        let collected_series: usize = table.values().map(|b| b.metrics.len()).sum();

        let mut out = String::new();
        self.render_self_stats(
            &mut out,
            collected_devices.len(),
            collected_plugins,
            collected_metrics,
            collected_series,
        );

        for bundle in table.values() {
            if bundle.kind == MetricKind::Unknown || !bundle.is_valid() {
                continue;
            }
            render_bundle(&mut out, bundle);
        }

        out
    }

    fn render_self_stats(
        &self,
        out: &mut String,
        collected_devices: usize,
        collected_plugins: usize,
        collected_metrics: usize,
        collected_series: usize,
    ) {
        let stats: [(&str, usize); 5] = [
            ("configured_devices", self.configured_devices),
            ("collected_devices", collected_devices),
            ("collected_plugins", collected_plugins),
            ("collected_metrics", collected_metrics),
            ("collected_series", collected_series),
        ];
        for (suffix, value) in stats {
            let name = format!("{}_{}", self.metric_prefix, suffix);
            out.push_str(&format!("# HELP {name} self-reported exporter statistic\n"));
            out.push_str(&format!("# TYPE {name} gauge\n"));
            out.push_str(&format!(
                "{name}{{instance_name=\"{}\"}} {value}\n",
                escape_label_value(&self.instance_name)
            ));
        }
    }
}

fn render_bundle(out: &mut String, bundle: &MetricBundle) {
    let type_str = match bundle.kind {
        MetricKind::Counter => "counter",
        MetricKind::Gauge => "gauge",
        MetricKind::Unknown => return,
    };
    out.push_str(&format!(
        "# HELP {} {}\n",
        bundle.metric_name, bundle.documentation
    ));
    out.push_str(&format!("# TYPE {} {}\n", bundle.metric_name, type_str));
    for metric in &bundle.metrics {
        let labels: Vec<String> = bundle
            .label_set
            .iter()
            .zip(metric.label_values.iter())
            .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
            .collect();
        out.push_str(&format!(
            "{}{{{}}} {} {}\n",
            bundle.metric_name,
            labels.join(","),
            metric.value,
            metric.timestamp * 1000
        ));
    }
}

fn escape_label_value(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Metric;
    use async_trait::async_trait;
    use crate::model::PathsDescriptor;

    struct StubPlugin {
        bundles: Vec<MetricBundle>,
    }

    #[async_trait]
    impl Plugin for StubPlugin {
        fn name(&self) -> &str {
            "stub"
        }
        fn get_paths(&self) -> PathsDescriptor {
            PathsDescriptor {
                xpath_list: vec![],
                datamodels: vec![],
                origin: "openconfig".into(),
                target: "stub".into(),
            }
        }
        fn gnmi_notification_handler(&self, _n: crate::model::Notification) {}
        fn set_sync_status(&self, _on_sync: bool) {}
        async fn fetch_metric_bundles(&self) -> Vec<MetricBundle> {
            self.bundles.clone()
        }
    }

    fn bundle(name: &str, device: &str) -> MetricBundle {
        MetricBundle {
            kind: MetricKind::Counter,
            device_name: device.into(),
            metric_name: name.into(),
            documentation: "doc".into(),
            label_set: vec!["l".into()],
            metrics: vec![Metric {
                label_values: vec!["v".into()],
                value: 1,
                timestamp: 0,
            }],
        }
    }

    #[tokio::test]
    async fn merges_duplicate_bundle_names_across_plugins() {
        let collector = Collector::new("inst".into(), "gnmi".into(), 2);
        collector
            .register_plugin(Arc::new(StubPlugin {
                bundles: vec![bundle("gnmi_iface_in_octets", "dev1")],
            }))
            .await;
        collector
            .register_plugin(Arc::new(StubPlugin {
                bundles: vec![bundle("gnmi_iface_in_octets", "dev2")],
            }))
            .await;

        let text = collector.collect().await;
        let series_lines = text
            .lines()
            .filter(|l| l.starts_with("gnmi_iface_in_octets{"))
            .count();
        assert_eq!(series_lines, 2);
    }

    #[tokio::test]
    async fn empty_render_contributes_nothing() {
        let collector = Collector::new("inst".into(), "gnmi".into(), 1);
        collector
            .register_plugin(Arc::new(StubPlugin { bundles: vec![] }))
            .await;
        let text = collector.collect().await;
        assert!(text.contains("gnmi_collected_plugins{instance_name=\"inst\"} 0"));
    }

    #[tokio::test]
    async fn self_statistics_reflect_configured_and_collected() {
        let collector = Collector::new("inst".into(), "gnmi".into(), 2);
        collector
            .register_plugin(Arc::new(StubPlugin {
                bundles: vec![bundle("m1", "dev1")],
            }))
            .await;
        collector
            .register_plugin(Arc::new(StubPlugin {
                bundles: vec![bundle("m2", "dev2")],
            }))
            .await;
        let text = collector.collect().await;
        assert!(text.contains("gnmi_configured_devices{instance_name=\"inst\"} 2"));
        assert!(text.contains("gnmi_collected_plugins{instance_name=\"inst\"} 2"));
    }
}
