// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Demo binary: wires the Store, the ingest/notify hosts, bridge/engage
//! registration, and the rule timer together the way a host environment
//! would, with a `LocalPlatform` standing in for the real integration
//! layer. Runs until Ctrl-C, then drains the same way `coopmux::run` does.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use hub_core::bridge::BridgeHost;
use hub_core::config::HubConfig;
use hub_core::constants::{Level, NotificationEvent};
use hub_core::ingest::IngestHost;
use hub_core::notify::NotifyHost;
use hub_core::platform::{LocalPlatform, PlatformApi};
use hub_core::renderer::RenderedView;
use hub_core::notify::NotifyCtx;
use hub_core::rules::threshold::{ThresholdConfig, ThresholdMode, ThresholdRule};
use hub_core::rules::RuleTimer;
use hub_core::store::Store;

#[derive(Debug, Parser)]
#[command(name = "hubd", about = "Message-hub core runtime demo host")]
struct Cli {
    #[command(flatten)]
    hub: HubConfig,

    /// `ids.namespace` handed to plugins through the platform interface.
    #[arg(long, default_value = "hub.0", env = "HUB_NAMESPACE")]
    namespace: String,
}

struct LoggingNotifier;

impl hub_core::notify::NotifyPlugin for LoggingNotifier {
    fn id(&self) -> &str {
        "log-notifier"
    }

    fn on_notify(&self, event: NotificationEvent, messages: &[RenderedView], _ctx: &NotifyCtx) {
        for message in messages {
            tracing::info!(event = %event, ref_ = %message.ref_, title = %message.title, "notification");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let platform: Arc<dyn PlatformApi> = Arc::new(LocalPlatform::new(cli.namespace.clone()));

    let (store_handle, notify_rx, store_join) = Store::spawn(cli.hub);
    let cancel = CancellationToken::new();

    let mut notify_host = NotifyHost::new(store_handle.clone(), platform.clone());
    notify_host.register(Arc::new(LoggingNotifier));
    let notify_join = notify_host.spawn(notify_rx, cancel.clone());

    // Neither plugin kind has a concrete implementation to register in this
    // demo; the hosts exist so the wiring shape (and id-collision rollback
    // for bridge/engage) is exercised even with an empty plugin set.
    let ingest_host = IngestHost::new(store_handle.clone(), platform.clone());
    let bridge_host = BridgeHost::new(store_handle.clone(), platform.clone());

    let mut rule_timer = RuleTimer::new(store_handle.clone(), Duration::from_secs(30));
    rule_timer.add_rule(Box::new(ThresholdRule::new(ThresholdConfig {
        id: "demo-threshold".into(),
        metric_ref: "sensor.status.demo".into(),
        metric_key: "value".into(),
        mode: ThresholdMode::Gt(100.0),
        hysteresis: None,
        min_duration_ms: None,
        alert_ref: "rule.status.demo_high".into(),
        alert_title: "Demo metric out of range".into(),
        alert_level: Level::Warning,
    })));
    let rules_join = rule_timer.spawn(cancel.clone());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining");
    cancel.cancel();
    let _ = notify_join.await;
    let _ = rules_join.await;

    // The store's actor loop exits once every handle clone is dropped,
    // closing its command channel; flush explicitly first so the drop
    // race can't skip a pending write.
    store_handle.flush_pending().await;
    drop(ingest_host);
    drop(bridge_host);
    drop(store_handle);
    let _ = store_join.await;

    Ok(())
}
