//! Opaque ID newtypes for type safety.
//!
//! Every identifier on the wire is minted by the host application, never by
//! the plugin. Wrapping each in its own newtype keeps a device ID from being
//! passed where an action-instance context is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a host-issued string.
            #[must_use]
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the ID is the empty string.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

opaque_id!(
    /// Identifies one live action instance, or the plugin itself for
    /// plugin-global commands.
    ContextId
);
opaque_id!(
    /// Reverse-DNS identifier of an action type, e.g. `com.example.counter`.
    ActionUuid
);
opaque_id!(
    /// Identifies a physical device attached to the host.
    DeviceId
);
opaque_id!(
    /// The plugin's own registration UUID.
    PluginUuid
);

impl From<PluginUuid> for ContextId {
    fn from(id: PluginUuid) -> Self {
        Self(id.0)
    }
}

impl From<&PluginUuid> for ContextId {
    fn from(id: &PluginUuid) -> Self {
        Self(id.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_inner() {
        let id = ContextId::new("ABC123");
        assert_eq!(id.to_string(), "ABC123");
        assert_eq!(id.as_str(), "ABC123");
    }

    #[test]
    fn serde_is_transparent() {
        let id = ActionUuid::new("com.example.counter");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"com.example.counter\"");
        let back: ActionUuid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn plugin_uuid_converts_to_context() {
        let plugin = PluginUuid::new("ABCDEF123456");
        let ctx: ContextId = (&plugin).into();
        assert_eq!(ctx.as_str(), plugin.as_str());
    }

    #[test]
    fn empty_detection() {
        assert!(ContextId::new("").is_empty());
        assert!(!DeviceId::new("dev").is_empty());
    }

    #[test]
    fn deref_to_str() {
        let id = DeviceId::from("D1");
        assert!(id.starts_with('D'));
    }
}
