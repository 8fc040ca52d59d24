//! Closed enumerations with an API value and a display name.
//!
//! The server stores enumerations as short codes (`"gpu"`, `"hour"`) while the
//! UI shows friendly names (`"GPU"`, `"Hour(s)"`). [`api_enum!`](crate::api_enum)
//! generates a closed enum that maps both ways.

/// Declare a closed enum mapped to API values and display names.
///
/// ```
/// verge_api::api_enum! {
///     /// Power state.
///     pub enum Power {
///         On => ("on", "Powered On"),
///         Off => ("off", "Powered Off"),
///     }
/// }
///
/// assert_eq!(Power::On.api_value(), "on");
/// assert_eq!(Power::from_display_name("powered off"), Some(Power::Off));
/// assert_eq!("ON".parse::<Power>().unwrap(), Power::On);
/// ```
#[macro_export]
macro_rules! api_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => ($api:literal, $display:literal) ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every member, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Value stored by the API.
            pub fn api_value(self) -> &'static str {
                match self {
                    $(Self::$variant => $api),+
                }
            }

            /// Human-readable name.
            pub fn display_name(self) -> &'static str {
                match self {
                    $(Self::$variant => $display),+
                }
            }

            pub fn from_api_value(value: &str) -> Option<Self> {
                match value {
                    $($api => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Case-insensitive lookup by display name.
            pub fn from_display_name(name: &str) -> Option<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.display_name().eq_ignore_ascii_case(name))
            }

            /// Accept either an API value or a display name, ignoring case.
            pub fn parse(value: &str) -> $crate::Result<Self> {
                let value = value.trim();
                Self::from_api_value(value)
                    .or_else(|| {
                        Self::ALL
                            .iter()
                            .copied()
                            .find(|v| v.api_value().eq_ignore_ascii_case(value))
                    })
                    .or_else(|| Self::from_display_name(value))
                    .ok_or_else(|| {
                        $crate::Error::InvalidArgument(format!(
                            "unknown {} {:?}, expected one of: {}",
                            stringify!($name),
                            value,
                            Self::ALL
                                .iter()
                                .map(|v| v.api_value())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ))
                    })
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.display_name())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::Error;

            fn from_str(s: &str) -> $crate::Result<Self> {
                Self::parse(s)
            }
        }

        impl $crate::__private::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error>
            where
                S: $crate::__private::Serializer,
            {
                serializer.serialize_str(self.api_value())
            }
        }

        impl<'de> $crate::__private::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> ::std::result::Result<Self, D::Error>
            where
                D: $crate::__private::Deserializer<'de>,
            {
                let value = <String as $crate::__private::Deserialize>::deserialize(deserializer)?;
                Self::from_api_value(&value).ok_or_else(|| {
                    <D::Error as $crate::__private::DeError>::custom(format!(
                        "unknown {} value {:?}",
                        stringify!($name),
                        value
                    ))
                })
            }
        }

        impl From<$name> for $crate::__private::Value {
            fn from(value: $name) -> Self {
                $crate::__private::Value::String(value.api_value().to_owned())
            }
        }
    };
}
