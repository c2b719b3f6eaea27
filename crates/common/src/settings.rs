//! Tuning surface shared by the pacer and the visibility window.
//!
//! Settings are read from YAML. Every field has a default so a partial file
//! (or an empty one) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::{MAX_STAGES, SectionIndex, StageId};

/// Errors from loading or validating settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("min_ticks_per_frame must be 0 or 1, got {0}")]
    InvalidMinTicks(u32),
    #[error("tick_rate_hz must be non-zero")]
    ZeroTickRate,
    #[error("ahead override names stage {0}, but stages end at {max}", max = MAX_STAGES - 1)]
    OverrideStageOutOfRange(u32),
    #[error("ahead override section range {first}..={last} is inverted")]
    OverrideRangeInverted {
        first: SectionIndex,
        last: SectionIndex,
    },
}

/// How the pacer spends the time left before the frame deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingPolicy {
    /// Sleep while the remaining budget is large, spin only the final stretch.
    #[default]
    Efficient,
    /// Yield-spin for the whole wait.
    SpinOnly,
}

/// What the pacer does while the simulation reports a loading state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FastLoadPolicy {
    Off,
    #[default]
    SkipPacing,
    SkipPacingAndToggleTearing,
    /// Skip pacing while loading, and hand idle wait time to pending load work.
    AlsoRunLoadDuringPacing,
}

impl FastLoadPolicy {
    pub fn skips_pacing(self) -> bool {
        !matches!(self, Self::Off)
    }

    pub fn toggles_tearing(self) -> bool {
        matches!(self, Self::SkipPacingAndToggleTearing)
    }

    pub fn pumps_load_work(self) -> bool {
        matches!(self, Self::AlsoRunLoadDuringPacing)
    }
}

/// Frame pacing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingSettings {
    /// Frames per second to pace to. Zero means uncapped.
    pub target_fps: u32,
    pub policy: PacingPolicy,
    pub fast_load: FastLoadPolicy,
    /// Either 1 (legacy: always advance) or 0 (allow zero-tick frames).
    pub min_ticks_per_frame: u32,
    /// Fixed rate of the simulation being driven.
    pub tick_rate_hz: u32,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            target_fps: 60,
            policy: PacingPolicy::Efficient,
            fast_load: FastLoadPolicy::SkipPacing,
            min_ticks_per_frame: 1,
            tick_rate_hz: 60,
        }
    }
}

impl PacingSettings {
    /// Target frame interval in milliseconds, or `None` when uncapped.
    pub fn target_interval_ms(&self) -> Option<f64> {
        (self.target_fps > 0).then(|| 1000.0 / f64::from(self.target_fps))
    }
}

/// Caps the look-ahead for a range of sections in one stage.
///
/// Used where the next sections of the track sit above or below the current
/// one rather than in front of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AheadSpanOverride {
    pub stage: u32,
    pub first_section: SectionIndex,
    pub last_section: SectionIndex,
    pub max_ahead: u32,
}

impl AheadSpanOverride {
    pub fn applies(&self, stage: StageId, section: SectionIndex) -> bool {
        self.stage == u32::from(stage.0)
            && section >= self.first_section
            && section <= self.last_section
    }
}

/// Visibility window configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilitySettings {
    pub ahead_span: u32,
    pub behind_span: u32,
    pub debug_capture: bool,
    pub ahead_overrides: Vec<AheadSpanOverride>,
}

impl Default for VisibilitySettings {
    fn default() -> Self {
        Self {
            ahead_span: 8,
            behind_span: 2,
            debug_capture: false,
            ahead_overrides: Vec::new(),
        }
    }
}

impl VisibilitySettings {
    /// Look-ahead to use at `section` of `stage`. Overrides only ever shrink it.
    pub fn ahead_span_at(&self, stage: StageId, section: SectionIndex) -> u32 {
        self.ahead_overrides
            .iter()
            .filter(|o| o.applies(stage, section))
            .fold(self.ahead_span, |span, o| span.min(o.max_ahead))
    }
}

/// Top-level settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pacing: PacingSettings,
    pub visibility: VisibilitySettings,
    /// Exclusion table to load at startup, relative to the working directory.
    pub exclusions: Option<PathBuf>,
}

impl Settings {
    /// Parse and validate settings from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, SettingsError> {
        // serde_yaml rejects an empty document, an empty file means "all defaults".
        let settings: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text)?
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let settings = Self::from_yaml_str(&text)?;
        tracing::info!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn to_yaml_string(&self) -> Result<String, SettingsError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.pacing.min_ticks_per_frame > 1 {
            return Err(SettingsError::InvalidMinTicks(
                self.pacing.min_ticks_per_frame,
            ));
        }
        if self.pacing.tick_rate_hz == 0 {
            return Err(SettingsError::ZeroTickRate);
        }
        for o in &self.visibility.ahead_overrides {
            if o.stage >= MAX_STAGES {
                return Err(SettingsError::OverrideStageOutOfRange(o.stage));
            }
            if o.first_section > o.last_section {
                return Err(SettingsError::OverrideRangeInverted {
                    first: o.first_section,
                    last: o.last_section,
                });
            }
        }
        Ok(())
    }
}
