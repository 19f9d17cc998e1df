//! Server settings and what changing them invalidates
//!
//! Settings arrive as `initializationOptions` and with every
//! `workspace/didChangeConfiguration`, either bare or nested under
//! [`SETTINGS_SECTION`]. A change is applied by diffing the old and new
//! settings and running the union of the [`EFFECTS`] of the changed keys.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::MatchMode;

pub const SETTINGS_SECTION: &str = "utilityCss";

/// Annotation ratio used when rem previews are switched off.
pub const DISABLED_RATIO: f64 = -1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub match_type: MatchMode,
    pub max_items: usize,
    pub rem_to_px_ratio: f64,
    pub rem_to_px_preview: bool,
    pub simple_mode: bool,
    pub language_ids: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            match_type: MatchMode::Prefix,
            max_items: 1000,
            rem_to_px_ratio: 16.0,
            rem_to_px_preview: true,
            simple_mode: false,
            language_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    MatchType,
    MaxItems,
    RemToPxRatio,
    RemToPxPreview,
    SimpleMode,
    LanguageIds,
}

impl SettingKey {
    pub fn name(self) -> &'static str {
        match self {
            SettingKey::MatchType => "matchType",
            SettingKey::MaxItems => "maxItems",
            SettingKey::RemToPxRatio => "remToPxRatio",
            SettingKey::RemToPxPreview => "remToPxPreview",
            SettingKey::SimpleMode => "simpleMode",
            SettingKey::LanguageIds => "languageIds",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Effect {
    /// Drop every cached autocomplete session.
    ClearSessions,
    /// Re-check `languageIds` and warn about unknown ids.
    ValidateLanguages,
}

pub const EFFECTS: &[(SettingKey, &[Effect])] = &[
    (SettingKey::MatchType, &[Effect::ClearSessions]),
    (SettingKey::MaxItems, &[Effect::ClearSessions]),
    (SettingKey::RemToPxRatio, &[Effect::ClearSessions]),
    (SettingKey::RemToPxPreview, &[Effect::ClearSessions]),
    (SettingKey::SimpleMode, &[Effect::ClearSessions]),
    (SettingKey::LanguageIds, &[Effect::ValidateLanguages]),
];

/// Union of the effects of `keys`.
pub fn effects_of(keys: &[SettingKey]) -> BTreeSet<Effect> {
    EFFECTS
        .iter()
        .filter(|(key, _)| keys.contains(key))
        .flat_map(|(_, effects)| effects.iter().copied())
        .collect()
}

impl Settings {
    /// Pixel ratio handed to the rem annotator.
    pub fn effective_ratio(&self) -> f64 {
        if self.rem_to_px_preview {
            self.rem_to_px_ratio
        } else {
            DISABLED_RATIO
        }
    }

    /// These settings with the keys present in `value` overridden.
    ///
    /// `value` may hold the settings directly or under [`SETTINGS_SECTION`].
    /// Keys set to `null` keep their current value.
    pub fn merged(&self, value: &Value) -> Result<Settings, serde_json::Error> {
        let section = value.get(SETTINGS_SECTION).unwrap_or(value);
        let mut merged = serde_json::to_value(self)?;
        if let (Value::Object(fields), Value::Object(patch)) = (&mut merged, section) {
            for (key, entry) in patch {
                if !entry.is_null() {
                    fields.insert(key.clone(), entry.clone());
                }
            }
        }
        serde_json::from_value(merged)
    }

    /// Keys whose values differ between `self` and `other`.
    pub fn diff(&self, other: &Settings) -> Vec<SettingKey> {
        let mut changed = Vec::new();
        if self.match_type != other.match_type {
            changed.push(SettingKey::MatchType);
        }
        if self.max_items != other.max_items {
            changed.push(SettingKey::MaxItems);
        }
        if self.rem_to_px_ratio != other.rem_to_px_ratio {
            changed.push(SettingKey::RemToPxRatio);
        }
        if self.rem_to_px_preview != other.rem_to_px_preview {
            changed.push(SettingKey::RemToPxPreview);
        }
        if self.simple_mode != other.simple_mode {
            changed.push(SettingKey::SimpleMode);
        }
        if self.language_ids != other.language_ids {
            changed.push(SettingKey::LanguageIds);
        }
        changed
    }
}
