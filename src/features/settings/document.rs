//! # Purchase Enhancement Settings
//!
//! The single settings document that gates and tunes every reminder job.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: `default_delivery_days` replaces the hard-coded 7 day fallback
//! - 1.0.0: Initial release

use crate::features::reminders::PriorityThresholds;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub const SETTINGS_DOCTYPE: &str = "Purchase Enhancement Settings";

/// Upper bound for every day-count setting (about ten years)
pub const MAX_DAYS: i64 = 3650;

/// Upper bound for `history_cache_duration` (one day)
pub const MAX_HISTORY_CACHE_SECS: u64 = 86_400;

/// Upper bound for history rows returned by one lookup
pub const MAX_HISTORY_ITEMS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    // Reminder lifecycle
    pub enable_auto_reminders: bool,
    pub default_follow_up_days: i64,
    /// Expected delivery fallback when the order has no schedule date
    pub default_delivery_days: i64,

    // Priority thresholds (percent of ordered quantity still pending)
    pub critical_priority_percentage: f64,
    pub high_priority_percentage: f64,
    pub medium_priority_percentage: f64,

    // Scheduled jobs
    pub auto_escalate_enabled: bool,
    pub send_daily_digest: bool,
    /// Comma separated email addresses
    pub digest_recipients: String,
    pub auto_cleanup_enabled: bool,
    pub archive_closed_reminders: bool,
    pub cleanup_after_days: i64,

    // Purchase history API
    pub enable_purchase_history: bool,
    /// Seconds
    pub history_cache_duration: u64,
    pub max_history_items: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            enable_auto_reminders: true,
            default_follow_up_days: 3,
            default_delivery_days: 7,
            critical_priority_percentage: 80.0,
            high_priority_percentage: 50.0,
            medium_priority_percentage: 25.0,
            auto_escalate_enabled: true,
            send_daily_digest: false,
            digest_recipients: String::new(),
            auto_cleanup_enabled: false,
            archive_closed_reminders: false,
            cleanup_after_days: 180,
            enable_purchase_history: true,
            history_cache_duration: 600,
            max_history_items: 5,
        }
    }
}

impl Settings {
    /// Load a settings document from a YAML file
    pub fn load_yaml(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("critical_priority_percentage", self.critical_priority_percentage),
            ("high_priority_percentage", self.high_priority_percentage),
            ("medium_priority_percentage", self.medium_priority_percentage),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(anyhow!("{} must be between 0 and 100, got {}", field, value));
            }
        }

        if self.critical_priority_percentage < self.high_priority_percentage
            || self.high_priority_percentage < self.medium_priority_percentage
        {
            return Err(anyhow!(
                "Priority thresholds must descend: critical ({}) >= high ({}) >= medium ({})",
                self.critical_priority_percentage,
                self.high_priority_percentage,
                self.medium_priority_percentage
            ));
        }

        for (field, value, min) in [
            ("default_follow_up_days", self.default_follow_up_days, 1),
            ("default_delivery_days", self.default_delivery_days, 0),
            ("cleanup_after_days", self.cleanup_after_days, 0),
        ] {
            if !(min..=MAX_DAYS).contains(&value) {
                return Err(anyhow!(
                    "{} must be between {} and {}, got {}",
                    field,
                    min,
                    MAX_DAYS,
                    value
                ));
            }
        }

        if self.history_cache_duration > MAX_HISTORY_CACHE_SECS {
            return Err(anyhow!(
                "history_cache_duration cannot exceed {} seconds",
                MAX_HISTORY_CACHE_SECS
            ));
        }
        if !(1..=MAX_HISTORY_ITEMS).contains(&self.max_history_items) {
            return Err(anyhow!(
                "max_history_items must be between 1 and {}",
                MAX_HISTORY_ITEMS
            ));
        }

        let email = regex::Regex::new(r"^[^@\s,]+@[^@\s,]+\.[^@\s,]+$")?;
        for recipient in self.digest_recipient_list() {
            if !email.is_match(&recipient) {
                return Err(anyhow!("Invalid digest recipient: {}", recipient));
            }
        }

        Ok(())
    }

    /// Trimmed, non-empty entries of `digest_recipients`
    pub fn digest_recipient_list(&self) -> Vec<String> {
        self.digest_recipients
            .split(',')
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn priority_thresholds(&self) -> PriorityThresholds {
        PriorityThresholds {
            critical: self.critical_priority_percentage,
            high: self.high_priority_percentage,
            medium: self.medium_priority_percentage,
        }
    }

    /// Cache TTL for history lookups, falling back to 10 minutes when unset
    pub fn history_ttl_secs(&self) -> u64 {
        if self.history_cache_duration == 0 {
            600
        } else {
            self.history_cache_duration
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert!(settings.enable_auto_reminders);
        assert!(!settings.send_daily_digest);
        assert_eq!(settings.default_follow_up_days, 3);
        assert_eq!(settings.cleanup_after_days, 180);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
send_daily_digest: true
digest_recipients: "buyer@example.com, , stores@example.com "
critical_priority_percentage: 90
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        settings.validate().unwrap();
        assert!(settings.send_daily_digest);
        assert_eq!(settings.critical_priority_percentage, 90.0);
        assert_eq!(settings.high_priority_percentage, 50.0);
        assert_eq!(
            settings.digest_recipient_list(),
            vec!["buyer@example.com".to_string(), "stores@example.com".to_string()]
        );
    }

    #[test]
    fn test_validate_threshold_order() {
        let settings = Settings {
            high_priority_percentage: 90.0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_threshold_range() {
        let settings = Settings {
            critical_priority_percentage: 120.0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_recipients() {
        let settings = Settings {
            digest_recipients: "buyer@example.com, not-an-address".to_string(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_follow_up_days() {
        let settings = Settings {
            default_follow_up_days: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_day_upper_bounds() {
        for settings in [
            Settings {
                default_follow_up_days: 1_000_000_000,
                ..Settings::default()
            },
            Settings {
                default_delivery_days: MAX_DAYS + 1,
                ..Settings::default()
            },
            Settings {
                cleanup_after_days: i64::MAX,
                ..Settings::default()
            },
        ] {
            assert!(settings.validate().is_err());
        }

        let at_limit = Settings {
            default_follow_up_days: MAX_DAYS,
            default_delivery_days: MAX_DAYS,
            cleanup_after_days: MAX_DAYS,
            ..Settings::default()
        };
        at_limit.validate().unwrap();
    }

    #[test]
    fn test_validate_history_bounds() {
        let long_ttl = Settings {
            history_cache_duration: u64::MAX,
            ..Settings::default()
        };
        assert!(long_ttl.validate().is_err());

        let many_rows = Settings {
            max_history_items: MAX_HISTORY_ITEMS + 1,
            ..Settings::default()
        };
        assert!(many_rows.validate().is_err());
    }

    #[test]
    fn test_history_ttl_fallback() {
        let settings = Settings {
            history_cache_duration: 0,
            ..Settings::default()
        };
        assert_eq!(settings.history_ttl_secs(), 600);
    }
}
