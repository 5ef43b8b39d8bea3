//! C3: per-device session engine. Owns the gRPC channel, the subscription
//! stream, the receive loop, and the watchdog for one configured device.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Streaming};

use crate::error::DialError;
use crate::gnmi::{
    self, subscribe_request, subscribe_response, CapabilityRequest, Encoding, GNmiClient,
    ModelData, Subscription, SubscriptionList, SubscriptionMode,
};
use crate::model::SessionConfig;
use crate::path;
use crate::plugin::Plugin;
use crate::watchdog::Watchdog;

const RECONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CAPABILITIES_DEADLINE: Duration = Duration::from_secs(10);

/// One independent long-running worker per configured device.
pub struct Session {
    config: SessionConfig,
    plugins: Vec<Arc<dyn Plugin>>,
    exit: Arc<AtomicBool>,
    wake: Arc<tokio::sync::Notify>,
}

impl Session {
    pub fn new(config: SessionConfig, plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self {
            config,
            plugins,
            exit: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(tokio::sync::Notify::new()),
        }
    }

    /// Requests shutdown: `EXITING` in the state machine. Wakes the
    /// STREAMING wait, which tears down and does not reconnect.
    pub fn close(&self) {
        self.exit.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Drives `DIALING -> CAPS_CHECK -> SUBSCRIBING -> STREAMING ->
    /// (DISCONNECT | EXITING)` until `close()` is called.
    pub async fn run(self: Arc<Self>) {
        loop {
            if self.exit.load(Ordering::SeqCst) {
                return;
            }
            match self.dial_and_stream().await {
                Ok(()) => {
                    // Returned from STREAMING via watchdog expiry or
                    // close(); DISCONNECT handling already ran inside
                    // dial_and_stream. Loop back to DIALING unless exiting.
                }
                Err(err) => {
                    tracing::warn!(device = %self.config.dev_name, error = %err, "dial failed");
                    self.wait_for_reconnect_or_exit().await;
                }
            }
            if self.exit.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    async fn wait_for_reconnect_or_exit(&self) {
        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_TIMEOUT) => {}
            _ = self.wake.notified() => {}
        }
    }

    async fn dial_and_stream(&self) -> Result<(), DialError> {
        // INIT -> DIALING
        let endpoint = Endpoint::from_shared(format!("http://{}:{}", self.config.ip, self.config.port))
            .map_err(|e| DialError::Connect {
                device: self.config.dev_name.clone(),
                port: self.config.port,
                source: e,
            })?;
        let channel: Channel = endpoint
            .connect()
            .await
            .map_err(|e| DialError::Connect {
                device: self.config.dev_name.clone(),
                port: self.config.port,
                source: e,
            })?;
        let mut client = GNmiClient::new(channel);

        // DIALING -> CAPS_CHECK
        let mut cap_request = Request::new(CapabilityRequest {});
        cap_request.set_timeout(CAPABILITIES_DEADLINE);
        attach_credentials(&mut cap_request, &self.config);
        let caps = client
            .capabilities(cap_request)
            .await
            .map_err(DialError::Capabilities)?
            .into_inner();

        for plugin in &self.plugins {
            for model in &plugin.get_paths().datamodels {
                if !caps.supported_models.iter().any(|m| &m.name == model) {
                    return Err(DialError::MissingDataModel(model.clone()));
                }
            }
        }

        let encoding = select_encoding(
            self.config.force_encoding.as_deref(),
            &caps.supported_encodings,
        );

        // CAPS_CHECK -> SUBSCRIBING
        let requests = build_subscribe_requests(&self.config, &self.plugins, encoding);
        let outbound = tokio_stream::iter(requests);
        let mut subscribe_request = Request::new(outbound);
        attach_credentials(&mut subscribe_request, &self.config);
        let response = client
            .subscribe(subscribe_request)
            .await
            .map_err(DialError::Subscribe)?;
        let stream = response.into_inner();

        // SUBSCRIBING -> STREAMING
        let watchdog = Watchdog::new(self.config.watchdog_timeout_s());
        let wd_handle = watchdog.spawn();
        let target_map = build_target_map(&self.plugins);
        let plugins = self.plugins.clone();
        let bypass = self.config.bypass_msg_routing;
        let dev_name = self.config.dev_name.clone();
        let kick = watchdog.kick_handle();

        let mut recv_handle =
            tokio::spawn(receive_loop(stream, plugins, target_map, bypass, dev_name, kick));

        tokio::select! {
            _ = watchdog.expired.notified() => {
                tracing::warn!(device = %self.config.dev_name, "watchdog expired, stream considered stalled");
            }
            _ = self.wake.notified() => {
                tracing::info!(device = %self.config.dev_name, "session close requested");
            }
            res = &mut recv_handle => {
                tracing::warn!(device = %self.config.dev_name, result = ?res, "receive loop ended");
            }
        }

        // DISCONNECT
        for plugin in &self.plugins {
            plugin.set_sync_status(false);
        }
        watchdog.stop();
        recv_handle.abort();
        let _ = wd_handle.await;

        Ok(())
    }
}

async fn receive_loop(
    mut stream: Streaming<gnmi::proto::SubscribeResponse>,
    plugins: Vec<Arc<dyn Plugin>>,
    target_map: HashMap<String, Arc<dyn Plugin>>,
    bypass: bool,
    dev_name: String,
    kick: crate::watchdog::KickHandle,
) {
    loop {
        match stream.message().await {
            Ok(Some(response)) => {
                kick.kick();
                route_response(response, &plugins, &target_map, bypass, &dev_name);
            }
            Ok(None) => {
                tracing::info!(device = %dev_name, "subscribe stream closed by peer");
                return;
            }
            Err(status) => {
                tracing::warn!(device = %dev_name, error = %status, "subscribe stream error");
                return;
            }
        }
    }
}

fn route_response(
    response: gnmi::proto::SubscribeResponse,
    plugins: &[Arc<dyn Plugin>],
    target_map: &HashMap<String, Arc<dyn Plugin>>,
    bypass: bool,
    dev_name: &str,
) {
    match response.response {
        Some(subscribe_response::Response::Update(notification)) => {
            let target = notification
                .prefix
                .as_ref()
                .map(|p| p.target.clone())
                .unwrap_or_default();
            let decoded = gnmi::from_proto_notification(&notification);
            if bypass {
                for p in plugins {
                    p.gnmi_notification_handler(decoded.clone());
                }
            } else if let Some(plugin) = target_map.get(&target) {
                plugin.gnmi_notification_handler(decoded);
            } else {
                tracing::error!(
                    device = %dev_name,
                    target,
                    "device does not support path target; enable bypass_msg_routing"
                );
            }
        }
        Some(subscribe_response::Response::SyncResponse(on_sync)) => {
            for p in plugins {
                p.set_sync_status(on_sync);
            }
        }
        Some(subscribe_response::Response::Error(e)) => {
            tracing::warn!(device = %dev_name, code = e.code, message = %e.message, "gnmi error response");
        }
        None => {}
    }
}

fn build_target_map(plugins: &[Arc<dyn Plugin>]) -> HashMap<String, Arc<dyn Plugin>> {
    plugins
        .iter()
        .map(|p| (p.get_paths().target, p.clone()))
        .collect()
}

/// Attaches `(username, password)` as per-RPC metadata, per the `INIT ->
/// DIALING` transition. TLS is an open hook, not implemented; this is the
/// only credential the insecure channel carries. Silently skips either
/// header when the corresponding field is empty rather than sending a
/// blank credential.
fn attach_credentials<T>(request: &mut Request<T>, config: &SessionConfig) {
    if !config.user.is_empty() {
        if let Ok(value) = tonic::metadata::MetadataValue::try_from(config.user.as_str()) {
            request.metadata_mut().insert("username", value);
        }
    }
    if !config.password.is_empty() {
        if let Ok(value) = tonic::metadata::MetadataValue::try_from(config.password.as_str()) {
            request.metadata_mut().insert("password", value);
        }
    }
}

fn select_encoding(force_encoding: Option<&str>, supported: &[i32]) -> Encoding {
    if let Some(name) = force_encoding {
        if let Some(enc) = gnmi::encoding_from_name(name) {
            if supported.contains(&(enc as i32)) {
                return enc;
            }
        }
    }
    for enc in gnmi::PREFERRED_ENCODINGS {
        if supported.contains(&(enc as i32)) {
            return enc;
        }
    }
    Encoding::Json
}

fn build_subscribe_requests(
    config: &SessionConfig,
    plugins: &[Arc<dyn Plugin>],
    encoding: Encoding,
) -> Vec<gnmi::proto::SubscribeRequest> {
    let mut requests = Vec::with_capacity(plugins.len());
    for plugin in plugins {
        let descriptor = plugin.get_paths();
        let mut sample_interval = config.sample_interval_ns();

        let mut subscriptions = Vec::new();
        for xpath in &descriptor.xpath_list {
            match path::xpath_to_gnmi(xpath, &descriptor.origin, None) {
                Ok(p) => {
                    // sample_interval is computed again here; the second
                    // assignment wins and is identical to the first. This
                    // mirrors a harmless duplicate computation in the
                    // upstream implementation rather than simplifying it
                    // away.
                    sample_interval = config.sample_interval_ns();
                    subscriptions.push(Subscription {
                        path: Some(gnmi::to_proto_path(&p)),
                        mode: SubscriptionMode::Sample as i32,
                        sample_interval,
                        suppress_redundant: false,
                        heartbeat_interval: 0,
                    });
                }
                Err(err) => {
                    tracing::warn!(xpath, error = %err, "skipping malformed xpath");
                }
            }
        }

        let prefix = gnmi::ProtoPath {
            origin: descriptor.origin.clone(),
            target: descriptor.target.clone(),
            elem: Vec::new(),
        };

        let list = SubscriptionList {
            prefix: Some(prefix),
            subscription: subscriptions,
            qos: false,
            mode: crate::gnmi::proto::subscription_list::Mode::Stream as i32,
            allow_aggregation: false,
            use_models: descriptor
                .datamodels
                .iter()
                .map(|name| ModelData {
                    name: name.clone(),
                    organization: String::new(),
                    version: String::new(),
                })
                .collect(),
            encoding: encoding as i32,
            updates_only: false,
        };

        requests.push(gnmi::proto::SubscribeRequest {
            request: Some(subscribe_request::Request::Subscribe(list)),
        });
    }
    requests
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gnmi::Encoding;

    #[test]
    fn encoding_prefers_proto_over_json() {
        let supported = vec![Encoding::Json as i32, Encoding::Proto as i32];
        assert_eq!(select_encoding(None, &supported), Encoding::Proto);
    }

    #[test]
    fn encoding_falls_back_to_json_default() {
        let supported: Vec<i32> = vec![];
        assert_eq!(select_encoding(None, &supported), Encoding::Json);
    }

    #[test]
    fn encoding_selection_literal_scenario() {
        // force_encoding="", device supports JSON + JSON_IETF -> JSON wins.
        let supported = vec![Encoding::Json as i32, Encoding::JsonIetf as i32];
        assert_eq!(select_encoding(None, &supported), Encoding::Json);
    }

    #[test]
    fn force_encoding_honored_when_supported() {
        let supported = vec![Encoding::Json as i32, Encoding::Proto as i32];
        assert_eq!(select_encoding(Some("PROTO"), &supported), Encoding::Proto);
    }

    fn config_with_creds(user: &str, password: &str) -> SessionConfig {
        SessionConfig {
            dev_name: "dev1".into(),
            ip: "127.0.0.1".into(),
            port: 57400,
            user: user.into(),
            password: password.into(),
            plugins: Vec::new(),
            scrape_interval_s: 60,
            oversampling: 2,
            wd_multiplier: 3,
            force_encoding: None,
            bypass_msg_routing: false,
        }
    }

    #[test]
    fn attaches_username_and_password_as_metadata() {
        let config = config_with_creds("admin", "hunter2");
        let mut req = Request::new(());
        attach_credentials(&mut req, &config);
        assert_eq!(req.metadata().get("username").unwrap().to_str().unwrap(), "admin");
        assert_eq!(req.metadata().get("password").unwrap().to_str().unwrap(), "hunter2");
    }

    #[test]
    fn skips_blank_credentials() {
        let config = config_with_creds("", "");
        let mut req = Request::new(());
        attach_credentials(&mut req, &config);
        assert!(req.metadata().get("username").is_none());
        assert!(req.metadata().get("password").is_none());
    }
}
