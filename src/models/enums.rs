use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
#[error("Unknown {field} label: {value}")]
pub struct UnknownLabel {
    pub field: &'static str,
    pub value: String,
}

/// Macro to generate a label enum with as_str + lenient label mapping.
///
/// Each variant has one canonical label (used when serializing) and any number
/// of accepted aliases. Deserialization never fails on an unknown label: it
/// falls back to the declared default, so upstream vocabulary drift degrades
/// to the conservative value instead of rejecting a whole report.
macro_rules! label_enum {
    ($name:ident, default = $default:ident {
        $($variant:ident => $s:literal $(| $alias:literal)*),+ $(,)?
    }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            /// Strict label lookup (case-insensitive, canonical label or alias).
            pub fn parse_label(label: &str) -> Option<Self> {
                let needle = label.trim();
                $(
                    if needle.eq_ignore_ascii_case($s) $(|| needle.eq_ignore_ascii_case($alias))* {
                        return Some(Self::$variant);
                    }
                )+
                None
            }

            /// Lenient lookup: unknown labels map to the default variant.
            pub fn from_label(label: &str) -> Self {
                Self::parse_label(label).unwrap_or_default()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownLabel;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse_label(s).ok_or_else(|| UnknownLabel {
                    field: stringify!($name),
                    value: s.into(),
                })
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = Option::<String>::deserialize(deserializer)?;
                Ok(raw.map(|label| Self::from_label(&label)).unwrap_or_default())
            }
        }
    };
}

label_enum!(RiskLevel, default = Normal {
    Normal => "normal",
    Low => "low" | "low_risk",
    Medium => "medium" | "medium_risk" | "moderate",
    High => "high" | "high_risk",
});

// Canonical metric status. Both historical vocabularies are folded in here:
// `warning`/`danger` from the first analyzer generation, `*_risk` from the second.
label_enum!(MetricStatus, default = Normal {
    Normal => "normal",
    LowRisk => "low_risk" | "low",
    MediumRisk => "medium_risk" | "warning" | "medium",
    HighRisk => "high_risk" | "danger" | "high",
});

label_enum!(VisualIndicator, default = Unflagged {
    High => "H",
    Low => "L",
    Moderate => "M",
    Up => "↑",
    Down => "↓",
    Unflagged => "normal" | "",
});

label_enum!(Trend, default = Stable {
    Increasing => "increasing",
    Decreasing => "decreasing",
    Stable => "stable",
});

impl RiskLevel {
    /// Ordering weight, higher is worse.
    pub fn severity(&self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }
}

impl MetricStatus {
    pub fn risk_level(&self) -> RiskLevel {
        match self {
            Self::Normal => RiskLevel::Normal,
            Self::LowRisk => RiskLevel::Low,
            Self::MediumRisk => RiskLevel::Medium,
            Self::HighRisk => RiskLevel::High,
        }
    }
}

impl From<RiskLevel> for MetricStatus {
    fn from(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Normal => Self::Normal,
            RiskLevel::Low => Self::LowRisk,
            RiskLevel::Medium => Self::MediumRisk,
            RiskLevel::High => Self::HighRisk,
        }
    }
}

impl VisualIndicator {
    /// Risk implied by a printed flag, if the flag implies one.
    pub fn implied_risk(&self) -> Option<RiskLevel> {
        match self {
            Self::High | Self::Up => Some(RiskLevel::High),
            Self::Moderate => Some(RiskLevel::Medium),
            Self::Low | Self::Down => Some(RiskLevel::Low),
            Self::Unflagged => None,
        }
    }
}
