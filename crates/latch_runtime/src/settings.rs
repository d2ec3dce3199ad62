//! Runtime settings
//!
//! Loaded from JSON; every field has a default so partial files work.

use anyhow::{Context, Result};
use latch_authority::{ComponentId, EntityId, VirtualWorkerId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Tracing filter used when `RUST_LOG` is unset.
    pub log_level: String,
    pub load_balancing: LoadBalancingSettings,
    pub coordination: CoordinationSettings,
    pub scenario: ScenarioSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancingSettings {
    /// When off, no worker runs its enforcer and authority never moves.
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationSettings {
    pub tick_rate_hz: u32,
    /// Number of coordination ticks to simulate.
    pub ticks: u64,
    /// Every N ticks each worker re-queues the entities whose ACL it holds.
    /// `0` disables the re-scan.
    pub rescan_interval_ticks: u64,
    /// Sleep between ticks to run at `tick_rate_hz` instead of flat out.
    pub realtime: bool,
}

/// A scenario given in a settings file replaces the built-in one entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSettings {
    /// Physical worker names; virtual workers are assigned `1..=N` in order.
    pub workers: Vec<String>,
    #[serde(default)]
    pub entities: Vec<EntitySettings>,
    #[serde(default)]
    pub intent_changes: Vec<IntentChange>,
    #[serde(default)]
    pub restarts: Vec<WorkerRestart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySettings {
    pub id: EntityId,
    pub intent: VirtualWorkerId,
    pub components: Vec<ComponentId>,
}

/// The load balancer moves `entity` to `intent` at `tick`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentChange {
    pub tick: u64,
    pub entity: EntityId,
    pub intent: VirtualWorkerId,
}

/// `worker` restarts at `tick`, losing all local state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRestart {
    pub tick: u64,
    pub worker: String,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("invalid settings in {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl CoordinationSettings {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate_hz.max(1)
    }

    /// Wall time covered by `ticks` ticks, saturating at [`u64::MAX`] nanoseconds.
    pub fn simulated_time(&self, ticks: u64) -> Duration {
        let nanos = self.tick_duration().as_nanos().saturating_mul(u128::from(ticks));
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            load_balancing: LoadBalancingSettings::default(),
            coordination: CoordinationSettings::default(),
            scenario: ScenarioSettings::default(),
        }
    }
}

impl Default for LoadBalancingSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for CoordinationSettings {
    fn default() -> Self {
        Self {
            tick_rate_hz: 30,
            ticks: 120,
            rescan_interval_ticks: 30,
            realtime: false,
        }
    }
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        let workers: Vec<String> = (1..=3).map(|i| format!("ServerWorker{i}")).collect();
        let entities = (1..=6)
            .map(|i: u32| EntitySettings {
                id: EntityId(i as i64),
                intent: VirtualWorkerId((i - 1) % 3 + 1),
                components: vec![100, 101, 102],
            })
            .collect();

        Self {
            workers,
            entities,
            intent_changes: vec![
                IntentChange {
                    tick: 40,
                    entity: EntityId(1),
                    intent: VirtualWorkerId(3),
                },
                IntentChange {
                    tick: 40,
                    entity: EntityId(2),
                    intent: VirtualWorkerId(1),
                },
                // Lands while ServerWorker2, the current owner, restarts.
                IntentChange {
                    tick: 60,
                    entity: EntityId(5),
                    intent: VirtualWorkerId(1),
                },
            ],
            restarts: vec![WorkerRestart {
                tick: 60,
                worker: "ServerWorker2".to_string(),
            }],
        }
    }
}
