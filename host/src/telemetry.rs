//! ==============================================================================
//! telemetry.rs - serial telemetry loop
//! ==============================================================================
//!
//! purpose:
//!     drives link -> parser -> alerts -> hub for the lifetime of the process.
//!
//! states:
//!
//!     idle ──> reading ──(line ok)──> publish, short pause ──┐
//!                 ^  │                                        │
//!                 │  ├─(timeout / blank / rejected line)──────┤
//!                 │  │                                        │
//!                 │  └─(link fault)──> faulted-backoff ─┐     │
//!                 └─────────────────────────────────────┴─────┘
//!
//!     a fault is never fatal: the loop waits out the backoff, tries to
//!     reopen the device if it is gone (when reconnect is enabled) and goes
//!     back to reading. every pause is an async sleep, so command handling
//!     and new observers keep running meanwhile.
//!
//! relationships:
//!     - spawned by: main.rs
//!     - uses: link.rs, parser.rs, alerts.rs, hub.rs
//!
//! ==============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::alerts;
use crate::config::HostConfig;
use crate::domain::TelemetryEvent;
use crate::hub::BroadcastHub;
use crate::link::{DeviceLink, LinkError};
use crate::parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Idle,
    Reading,
    FaultedBackoff,
}

/// running totals since startup
#[derive(Debug, Default)]
pub struct TelemetryStats {
    published: AtomicU64,
    rejected: AtomicU64,
    faults: AtomicU64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub published: u64,
    pub rejected: u64,
    pub faults: u64,
}

impl TelemetryStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}

pub struct TelemetryLoop {
    link: DeviceLink,
    hub: BroadcastHub,
    read_timeout: Duration,
    yield_interval: Duration,
    backoff: Duration,
    reconnect: bool,
    // no device at startup, nothing to come back to without reconnect
    started_absent: bool,
    show_sensor_data: bool,
    stats: Arc<TelemetryStats>,
}

impl TelemetryLoop {
    pub fn new(link: DeviceLink, hub: BroadcastHub, config: &HostConfig) -> Self {
        let started_absent = !link.is_connected();
        Self {
            link,
            hub,
            read_timeout: config.serial.read_timeout(),
            yield_interval: config.telemetry.yield_interval(),
            backoff: config.telemetry.backoff(),
            reconnect: config.serial.reconnect,
            started_absent,
            show_sensor_data: config.logging.show_sensor_data,
            stats: Arc::new(TelemetryStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<TelemetryStats> {
        self.stats.clone()
    }

    /// run until the process exits
    ///
    /// returns early only when there was no device at startup and reconnect
    /// is disabled. a device lost later keeps the loop in backoff.
    pub async fn run(self) {
        let mut state = LoopState::Idle;

        loop {
            state = match state {
                LoopState::Idle => {
                    tracing::info!("telemetry loop started");
                    LoopState::Reading
                }
                LoopState::Reading => match self.link.read_line(self.read_timeout).await {
                    Ok(raw) => {
                        self.handle_line(&raw).await;
                        LoopState::Reading
                    }
                    Err(LinkError::Timeout) => LoopState::Reading,
                    Err(LinkError::NotInitialized) if self.started_absent && !self.reconnect => {
                        tracing::warn!("serial not initialized, telemetry disabled");
                        return;
                    }
                    Err(LinkError::NotInitialized) => {
                        tracing::debug!("serial not initialized, waiting");
                        LoopState::FaultedBackoff
                    }
                    Err(e) => {
                        tracing::warn!("error reading serial: {}", e);
                        self.stats.faults.fetch_add(1, Ordering::Relaxed);
                        LoopState::FaultedBackoff
                    }
                },
                LoopState::FaultedBackoff => {
                    tokio::time::sleep(self.backoff).await;
                    if self.reconnect && !self.link.is_connected() {
                        if let Err(e) = self.link.reconnect().await {
                            tracing::debug!("reconnect failed: {}", e);
                        }
                    }
                    LoopState::Reading
                }
            };
        }
    }

    async fn handle_line(&self, raw: &[u8]) {
        let line = parser::decode_line(raw);
        if line.is_empty() {
            return;
        }

        let Some(reading) = parser::parse_reading(&line) else {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let alerts = alerts::evaluate(&reading);
        if self.show_sensor_data {
            tracing::info!(
                "Temp: {:.1}°C | Humidity: {:.1}% | Light: {} | Gas: {} | Rain: {} | Alerts: {:?}",
                reading.temperature,
                reading.humidity,
                reading.light,
                reading.gas_level,
                reading.rain,
                alerts
            );
        } else {
            tracing::debug!(?reading, ?alerts, "reading");
        }

        let reached = self.hub.publish(TelemetryEvent::new(reading, alerts));
        tracing::trace!("event sent to {} observers", reached);
        self.stats.published.fetch_add(1, Ordering::Relaxed);

        tokio::time::sleep(self.yield_interval).await;
    }
}
