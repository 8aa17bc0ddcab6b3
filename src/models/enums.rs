use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        $(#[$meta])*
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(
    #[serde(rename_all = "snake_case")]
    RecordKind {
        Graduation => "graduation",
        Identity => "identity",
        Internship => "internship",
        JrSecondary => "jr_secondary",
        SrSecondary => "sr_secondary",
    }
);

impl RecordKind {
    /// Every authoritative collection, in the order the matcher scans them.
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Graduation,
        RecordKind::Identity,
        RecordKind::Internship,
        RecordKind::JrSecondary,
        RecordKind::SrSecondary,
    ];

    /// Table backing this collection.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Graduation => "graduation_records",
            Self::Identity => "identity_records",
            Self::Internship => "internship_records",
            Self::JrSecondary => "jr_secondary_records",
            Self::SrSecondary => "sr_secondary_records",
        }
    }
}

str_enum!(
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    TamperVerdict {
        Genuine => "GENUINE",
        Tampered => "TAMPERED",
        Unknown => "UNKNOWN",
    }
);

str_enum!(
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    RiskLevel {
        Low => "LOW",
        Medium => "MEDIUM",
        High => "HIGH",
    }
);

str_enum!(
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    Decision {
        Verified => "VERIFIED",
        Rejected => "REJECTED",
        Inconclusive => "INCONCLUSIVE",
        InconclusiveDegraded => "INCONCLUSIVE_DEGRADED",
    }
);

str_enum!(
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    EvidenceExposure {
        None => "NONE",
        Full => "FULL",
        Unavailable => "UNAVAILABLE",
    }
);
