use serde::{Deserialize, Serialize};

use super::InvalidEnum;

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The literal doubles as the serialized form.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnum {
                        kind: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(RuleStatus {
    Pass => "PASS",
    Fail => "FAIL",
    Skip => "SKIP",
    Error => "ERROR",
});

impl RuleStatus {
    /// Parse a verdict from model output. ERROR is reserved for local failures.
    pub fn parse_verdict(raw: &str) -> Result<Self, InvalidEnum> {
        let status: RuleStatus = raw.trim().to_uppercase().parse()?;
        if status == RuleStatus::Error {
            return Err(InvalidEnum {
                kind: "RuleStatus".into(),
                value: raw.into(),
            });
        }
        Ok(status)
    }
}

str_enum!(DocumentKind {
    Chart => "chart",
    Irp => "irp",
});
