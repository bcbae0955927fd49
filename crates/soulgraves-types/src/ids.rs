//! Type-safe identifier wrappers.
//!
//! Players and soul markers are identified by [`Uuid`]s generated by the
//! game host. Nodes are identified by their configured server name, which
//! is also the value written to the `serverName` storage column.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier (UUID v4, as issued by the game host).
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }

            /// Parse an identifier from its hyphenated string form.
            ///
            /// # Errors
            ///
            /// Returns [`uuid::Error`] if `s` is not a valid UUID.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier of a player (soul owner or pickup actor).
    PlayerId
}

define_id! {
    /// Unique identifier of a soul's physical marker in the world.
    ///
    /// Globally unique across the cluster; used as the cross-node join key.
    MarkerId
}

/// Identifier of a game-server process in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node identifier from a server name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Return the server name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_display_matches_uuid() {
        let id = MarkerId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }

    #[test]
    fn parse_round_trips_display() {
        let id = PlayerId::new();
        let parsed = PlayerId::parse(&id.to_string());
        assert_eq!(parsed.ok(), Some(id));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(MarkerId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn node_id_serializes_as_plain_string() {
        let node = NodeId::new("survival-1");
        let json = serde_json::to_string(&node).unwrap_or_default();
        assert_eq!(json, "\"survival-1\"");
    }
}
