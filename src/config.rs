use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::capture::{CameraFacing, ScanLoopConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            timeout_secs: 10,
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSettings {
    pub preferred_facing: CameraFacing,
    pub sample_interval_ms: u64,
    pub change_threshold: u32,
    pub recheck_cooldown_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        let defaults = ScanLoopConfig::default();
        Self {
            preferred_facing: CameraFacing::Environment,
            sample_interval_ms: defaults.sample_interval.as_millis() as u64,
            change_threshold: defaults.change_threshold,
            recheck_cooldown_ms: defaults.recheck_cooldown.as_millis() as u64,
        }
    }
}

impl CaptureSettings {
    pub fn loop_config(&self) -> ScanLoopConfig {
        ScanLoopConfig {
            sample_interval: Duration::from_millis(self.sample_interval_ms.max(1)),
            change_threshold: self.change_threshold,
            recheck_cooldown: Duration::from_millis(self.recheck_cooldown_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeSettings {
    pub dismiss_secs: u64,
}

impl Default for NoticeSettings {
    fn default() -> Self {
        Self { dismiss_secs: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySettings {
    pub visible_limit: u32,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self { visible_limit: 25 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScannerSettings {
    pub api: ApiSettings,
    pub capture: CaptureSettings,
    pub notice: NoticeSettings,
    pub history: HistorySettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<ScannerSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            ScannerSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings(&self) -> ScannerSettings {
        self.data.read().unwrap().clone()
    }

    pub fn update(&self, settings: ScannerSettings) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            *guard = settings;
            self.persist(&guard)?;
        }
        Ok(())
    }

    fn persist(&self, data: &ScannerSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("failed to write settings to {}", self.path.display()))
    }
}
