//! Categorical labels emitted by the model.
//!
//! The model is asked for a closed vocabulary but does not always comply, so
//! each label keeps an `Other` variant carrying the raw text. Histograms over
//! these labels open a new bucket for unexpected values instead of failing.

use serde::{Deserialize, Serialize};

macro_rules! open_label {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            Other(String),
        }

        impl $name {
            /// The closed vocabulary, in display order.
            pub const KNOWN: &'static [&'static str] = &[$($text),+];

            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $($name::$variant => $text,)+
                    $name::Other(raw) => raw.as_str(),
                }
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                match raw.trim() {
                    $(t if t.eq_ignore_ascii_case($text) => $name::$variant,)+
                    _ => $name::Other(raw),
                }
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                $name::from(raw.to_string())
            }
        }

        impl From<$name> for String {
            fn from(label: $name) -> Self {
                label.as_str().to_string()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

open_label! {
    /// Urgency (evidence path) or frustration (base path) of a problem.
    Level { High => "High", Medium => "Medium", Low => "Low" }
}

open_label! {
    /// Whether the author signals willingness to pay for a fix.
    WillingToPay { Yes => "Yes", No => "No", Maybe => "Maybe", Unknown => "Unknown" }
}

open_label! {
    /// Whether the problem looks addressable by a SaaS product.
    SaasPotential { Yes => "Yes", No => "No", Uncertain => "Uncertain" }
}

impl Default for Level {
    fn default() -> Self {
        Level::Low
    }
}

impl Default for WillingToPay {
    fn default() -> Self {
        WillingToPay::Unknown
    }
}

impl Default for SaasPotential {
    fn default() -> Self {
        SaasPotential::Uncertain
    }
}
