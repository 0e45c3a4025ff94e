//! Risk, confidence, alert threshold and attack strength levels

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Risk level of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Info,
    Low,
    Medium,
    High,
}

impl Risk {
    pub fn as_str(&self) -> &'static str {
        match self {
            Risk::Info => "info",
            Risk::Low => "low",
            Risk::Medium => "medium",
            Risk::High => "high",
        }
    }
}

/// How sure an analyzer or plugin is about an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    FalsePositive,
    Low,
    Medium,
    High,
    Confirmed,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::FalsePositive => "false_positive",
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
            Confidence::Confirmed => "confirmed",
        }
    }
}

/// Sensitivity of an analyzer or plugin.
///
/// `Off < Low < Medium < High`; `Default` resolves to the owner's default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertThreshold {
    Off,
    Low,
    Medium,
    High,
    #[default]
    Default,
}

impl AlertThreshold {
    /// Replace `Default` with `fallback` (itself `Medium` when also `Default`)
    pub fn resolve(self, fallback: AlertThreshold) -> AlertThreshold {
        match (self, fallback) {
            (AlertThreshold::Default, AlertThreshold::Default) => AlertThreshold::Medium,
            (AlertThreshold::Default, fallback) => fallback,
            (threshold, _) => threshold,
        }
    }

    pub fn is_off(self) -> bool {
        self == AlertThreshold::Off
    }

    /// Whether an alert of this confidence is reported at this threshold.
    ///
    /// Low reports everything, High only high-confidence alerts, Off nothing.
    pub fn permits(self, confidence: Confidence) -> bool {
        let minimum = match self.resolve(AlertThreshold::Medium) {
            AlertThreshold::Off => return false,
            AlertThreshold::Low => Confidence::Low,
            AlertThreshold::High => Confidence::High,
            AlertThreshold::Medium | AlertThreshold::Default => Confidence::Medium,
        };
        confidence >= minimum
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertThreshold::Off => "OFF",
            AlertThreshold::Low => "LOW",
            AlertThreshold::Medium => "MEDIUM",
            AlertThreshold::High => "HIGH",
            AlertThreshold::Default => "DEFAULT",
        }
    }
}

impl FromStr for AlertThreshold {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OFF" => Ok(AlertThreshold::Off),
            "LOW" => Ok(AlertThreshold::Low),
            "MEDIUM" => Ok(AlertThreshold::Medium),
            "HIGH" => Ok(AlertThreshold::High),
            "DEFAULT" => Ok(AlertThreshold::Default),
            _ => Err(ConfigError::InvalidThreshold(s.to_string())),
        }
    }
}

impl fmt::Display for AlertThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many payloads an active plugin tries per injection point
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttackStrength {
    Low,
    #[default]
    Medium,
    High,
    Insane,
}

impl AttackStrength {
    /// Upper bound on payloads per injection point
    pub fn payload_limit(self) -> usize {
        match self {
            AttackStrength::Low => 2,
            AttackStrength::Medium => 4,
            AttackStrength::High => 8,
            AttackStrength::Insane => usize::MAX,
        }
    }

    /// The first payloads of `payloads` allowed at this strength
    pub fn select<'a, T>(self, payloads: &'a [T]) -> &'a [T] {
        &payloads[..payloads.len().min(self.payload_limit())]
    }
}

impl FromStr for AttackStrength {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(AttackStrength::Low),
            "MEDIUM" => Ok(AttackStrength::Medium),
            "HIGH" => Ok(AttackStrength::High),
            "INSANE" => Ok(AttackStrength::Insane),
            _ => Err(ConfigError::InvalidStrength(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_permits() {
        assert!(!AlertThreshold::Off.permits(Confidence::Confirmed));

        assert!(AlertThreshold::Low.permits(Confidence::Low));
        assert!(!AlertThreshold::Low.permits(Confidence::FalsePositive));

        assert!(!AlertThreshold::Medium.permits(Confidence::Low));
        assert!(AlertThreshold::Medium.permits(Confidence::Medium));

        assert!(!AlertThreshold::High.permits(Confidence::Medium));
        assert!(AlertThreshold::High.permits(Confidence::High));
        assert!(AlertThreshold::High.permits(Confidence::Confirmed));
    }

    #[test]
    fn test_default_resolution() {
        assert_eq!(AlertThreshold::Default.resolve(AlertThreshold::Low), AlertThreshold::Low);
        assert_eq!(AlertThreshold::Default.resolve(AlertThreshold::Default), AlertThreshold::Medium);
        assert_eq!(AlertThreshold::High.resolve(AlertThreshold::Low), AlertThreshold::High);
        assert!(!AlertThreshold::Default.permits(Confidence::Low));
    }

    #[test]
    fn test_threshold_parsing() {
        assert_eq!("low".parse::<AlertThreshold>().unwrap(), AlertThreshold::Low);
        assert_eq!(" OFF ".parse::<AlertThreshold>().unwrap(), AlertThreshold::Off);
        assert!(matches!(
            "severe".parse::<AlertThreshold>(),
            Err(ConfigError::InvalidThreshold(_))
        ));
        assert_eq!(AlertThreshold::Medium.to_string(), "MEDIUM");
    }

    #[test]
    fn test_strength_selects_payloads() {
        let payloads = [1, 2, 3, 4, 5, 6];
        assert_eq!(AttackStrength::Low.select(&payloads), &[1, 2]);
        assert_eq!(AttackStrength::Insane.select(&payloads).len(), 6);
        assert!("extreme".parse::<AttackStrength>().is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(Risk::High > Risk::Low);
        assert!(Confidence::Confirmed > Confidence::High);
        assert!(AttackStrength::Insane > AttackStrength::Low);
    }
}
