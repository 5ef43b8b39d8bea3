//! C2: plugin framework. A plugin is polymorphic over the capability set
//! `{get_paths, fetch_metric_bundles, gnmi_notification_handler,
//! set_sync_status}`; [`PluginBuffer`] supplies the shared buffering and
//! sync-gating state that every concrete plugin composes with.

pub mod oc_interfaces;

use std::sync::Mutex;

use crate::gnmi;
use crate::model::{GnmiDelete, GnmiUpdate, MetricBundle, Notification, PathsDescriptor};

/// Capability interface every data-model translator implements. The base
/// buffering behavior lives in [`PluginBuffer`]; concrete plugins embed one
/// and add parsing on top in `fetch_metric_bundles`.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Pure; returns what the session must subscribe to. Idempotent.
    fn get_paths(&self) -> PathsDescriptor;

    /// Producer side: append to the buffer under the mutex. Must not block
    /// on I/O.
    fn gnmi_notification_handler(&self, notification: Notification);

    /// On `true -> false` (desync), clears the buffer before updating the
    /// flag. Any other transition just updates it.
    fn set_sync_status(&self, on_sync: bool);

    /// Consumer side, invoked concurrently with the producer. Snapshots and
    /// drains the buffer only when `on_sync == true`.
    async fn fetch_metric_bundles(&self) -> Vec<MetricBundle>;
}

/// Shared mutex-guarded state backing every plugin: the raw notification
/// buffer and the sync flag. Embedded by concrete plugins rather than
/// inherited, per Rust's composition-over-inheritance idiom for the
/// "abstract base class" the original relies on.
pub struct PluginBuffer {
    inner: Mutex<BufferState>,
}

struct BufferState {
    buffer: Vec<Notification>,
    on_sync: bool,
}

impl Default for PluginBuffer {
    fn default() -> Self {
        Self {
            inner: Mutex::new(BufferState {
                buffer: Vec::new(),
                on_sync: false,
            }),
        }
    }
}

impl PluginBuffer {
    pub fn push(&self, notification: Notification) {
        let mut state = self.inner.lock().unwrap();
        state.buffer.push(notification);
    }

    pub fn set_sync_status(&self, on_sync: bool) {
        let mut state = self.inner.lock().unwrap();
        if state.on_sync && !on_sync {
            // Desync: data received out of sync is untrustworthy for
            // counter reporting and must not leak into the next window.
            state.buffer.clear();
        }
        state.on_sync = on_sync;
    }

    /// Drains the buffer (only if currently synced), flattens every
    /// notification into update/delete messages, and stable-sorts both
    /// lists by timestamp ascending. Returns `(updates, deletes)`; both
    /// empty when not synced or when nothing was buffered.
    pub fn checkout(&self) -> (Vec<GnmiUpdate>, Vec<GnmiDelete>) {
        let drained = {
            let mut state = self.inner.lock().unwrap();
            if !state.on_sync {
                return (Vec::new(), Vec::new());
            }
            std::mem::take(&mut state.buffer)
        };

        let mut updates = Vec::new();
        let mut deletes = Vec::new();
        for n in &drained {
            let (u, d) = gnmi::flatten(n);
            updates.extend(u);
            deletes.extend(d);
        }
        updates.sort_by_key(|u| u.timestamp);
        deletes.sort_by_key(|d| d.timestamp);
        (updates, deletes)
    }
}

/// Builds the configured plugin set for one session, by name. Unknown
/// names are logged and skipped, matching the teacher pipeline's
/// unknown-plugin-name handling.
pub fn build_plugins(names: &[String], dev_name: &str, instance_name: &str, metric_prefix: &str) -> Vec<std::sync::Arc<dyn Plugin>> {
    let mut plugins: Vec<std::sync::Arc<dyn Plugin>> = Vec::new();
    for name in names {
        match name.as_str() {
            "openconfig-interfaces" => {
                plugins.push(std::sync::Arc::new(oc_interfaces::OcInterfaces::new(
                    dev_name,
                    instance_name,
                    metric_prefix,
                )));
            }
            other => {
                tracing::warn!(plugin = %other, "unknown plugin name, skipping");
            }
        }
    }
    plugins
}
