//! Exercises the `/metrics` HTTP surface end to end against a collector
//! fed by a real plugin, rather than the stub used by the in-crate unit
//! test in `lib.rs`.

use std::sync::Arc;

use gnmi_exporter::collector::Collector;
use gnmi_exporter::model::{Notification, NotificationUpdate, Path, PathElem, TypedValue};
use gnmi_exporter::plugin::oc_interfaces::OcInterfaces;
use gnmi_exporter::plugin::Plugin;
use gnmi_exporter::{app, AppState};
use http_body_util::BodyExt;
use std::collections::HashMap;
use tower::ServiceExt;

fn leaf_update(leaf: &str, value: TypedValue) -> Notification {
    let mut iface_keys = HashMap::new();
    iface_keys.insert("name".to_string(), "eth0".to_string());
    Notification {
        timestamp: 1,
        atomic: false,
        prefix: Path {
            elements: vec![
                PathElem {
                    name: "interfaces".into(),
                    keys: HashMap::new(),
                },
                PathElem {
                    name: "interface".into(),
                    keys: iface_keys,
                },
            ],
            origin: "openconfig".into(),
            target: Some("oc_interfaces".into()),
        },
        updates: vec![NotificationUpdate {
            path: Path {
                elements: vec![
                    PathElem {
                        name: "state".into(),
                        keys: HashMap::new(),
                    },
                    PathElem {
                        name: leaf.into(),
                        keys: HashMap::new(),
                    },
                ],
                origin: "openconfig".into(),
                target: None,
            },
            value: Some(value),
            duplicates: 0,
        }],
        deletes: vec![],
    }
}

#[tokio::test]
async fn metrics_endpoint_renders_plugin_bundles_and_self_stats() {
    let plugin = Arc::new(OcInterfaces::new("dev1", "inst1", "gnmi"));
    plugin.set_sync_status(true);
    plugin.gnmi_notification_handler(leaf_update("name", TypedValue::String("eth0".into())));
    plugin.gnmi_notification_handler(leaf_update("in-octets", TypedValue::Int(123)));

    let collector = Arc::new(Collector::new("inst1".to_string(), "gnmi".to_string(), 1));
    collector.register_plugin(plugin).await;

    let state = AppState { collector };
    let router = app(state);

    let response = router
        .oneshot(
            axum::http::Request::builder()
                .uri("/metrics")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();

    assert!(text.contains("gnmi_configured_devices{instance_name=\"inst1\"} 1"));
    assert!(text.contains("gnmi_collected_plugins{instance_name=\"inst1\"} 1"));
    assert!(text.contains("# TYPE gnmi_iface_in_octets counter"));
    assert!(text.contains("gnmi_iface_in_octets{"));
    assert!(text.contains("device=\"dev1\""));
}
