//! Status and category enums with stable storage codes
//!
//! Lifecycle enums are persisted as upper-case text codes (`"OFFER_GENERATED"`,
//! `"BOUNCED"`). `code_enum!` declares the enum together with its code table so
//! serde, `Display` and storage parsing can never disagree.

/// Declares an enum whose variants map one-to-one onto text codes
///
/// ```rust,ignore
/// core_kernel::code_enum! {
///     /// EMI lifecycle
///     pub enum EmiStatus {
///         Pending => "PENDING",
///         Paid => "PAID",
///     }
/// }
///
/// assert_eq!(EmiStatus::Paid.as_str(), "PAID");
/// assert_eq!(EmiStatus::parse_code("PENDING"), Some(EmiStatus::Pending));
/// ```
#[macro_export]
macro_rules! code_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $code:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $($(#[$vmeta])* #[serde(rename = $code)] $variant),+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Storage code
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }

            /// Parses a storage code
            pub fn parse_code(code: &str) -> Option<Self> {
                match code {
                    $($code => Some($name::$variant),)+
                    _ => None,
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

#[cfg(test)]
mod tests {
    crate::code_enum! {
        enum Light {
            Red => "RED",
            Amber => "AMBER_LIGHT",
        }
    }

    #[test]
    fn test_codes_roundtrip() {
        for light in Light::ALL {
            assert_eq!(Light::parse_code(light.as_str()), Some(*light));
        }
        assert_eq!(Light::parse_code("GREEN"), None);
        assert_eq!(Light::Amber.to_string(), "AMBER_LIGHT");
    }

    #[test]
    fn test_serde_uses_codes() {
        assert_eq!(serde_json::to_string(&Light::Amber).unwrap(), "\"AMBER_LIGHT\"");
        let parsed: Light = serde_json::from_str("\"RED\"").unwrap();
        assert_eq!(parsed, Light::Red);
    }
}
