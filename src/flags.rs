use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "INFLOW_FF_";

fn default_enabled_true() -> bool {
    true
}

/// Runtime switches for controlled degradation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Kill switch for the counterfactual reasoner.
    #[serde(default = "default_enabled_true")]
    pub counterfactual_enabled: bool,
    #[serde(default = "default_enabled_true")]
    pub detailed_explanations: bool,
    /// Skip the preference and memory fetches and run on identity alone.
    #[serde(default)]
    pub degraded_mode: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            counterfactual_enabled: true,
            detailed_explanations: true,
            degraded_mode: false,
        }
    }
}

impl FeatureFlags {
    pub fn with_process_env(self) -> Self {
        self.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `INFLOW_FF_<NAME>` overrides; unparseable values leave the flag as is.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let fields: [(&str, &mut bool); 3] = [
            ("COUNTERFACTUAL_ENABLED", &mut self.counterfactual_enabled),
            ("DETAILED_EXPLANATIONS", &mut self.detailed_explanations),
            ("DEGRADED_MODE", &mut self.degraded_mode),
        ];
        for (name, slot) in fields {
            let key = format!("{ENV_PREFIX}{name}");
            let Some(raw) = lookup(&key) else {
                continue;
            };
            match parse_flag(&raw) {
                Some(value) => {
                    tracing::info!(
                        target: "flags",
                        flag = %key,
                        value = value,
                        "flag_overridden_by_env"
                    );
                    *slot = value;
                }
                None => {
                    tracing::warn!(
                        target: "flags",
                        flag = %key,
                        raw = %raw,
                        "flag_override_ignored"
                    );
                }
            }
        }
        self
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
