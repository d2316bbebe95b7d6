use rand::Rng;
use std::fmt;

/// Renders a fresh random 128-bit value as 32 lowercase hex chars.
fn random_id() -> String {
    let value: u128 = rand::thread_rng().gen();
    format!("{:032x}", value)
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                $name(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_string())
            }
        }
    };
}

string_id!(
    /// Durable id of a logical actor. Maps 1:1 to a lease key and a metadata record in the
    /// coordination store.
    ActorId
);

string_id!(
    /// Id of one running process. Generated fresh on every start and never persisted; it names
    /// the node's pub/sub channel and is the value a lease holder writes.
    NodeId
);

string_id!(
    /// One logical client connection's claim on an actor.
    ConnId
);

string_id!(RequestId);
string_id!(WebSocketId);
string_id!(MessageId);

impl NodeId {
    pub fn generate() -> Self {
        NodeId(random_id())
    }
}

impl ConnId {
    pub(crate) fn generate() -> Self {
        ConnId(random_id())
    }
}

impl RequestId {
    pub(crate) fn generate() -> Self {
        RequestId(random_id())
    }
}

impl WebSocketId {
    pub(crate) fn generate() -> Self {
        WebSocketId(random_id())
    }
}

impl MessageId {
    pub(crate) fn generate() -> Self {
        MessageId(random_id())
    }
}

/// Immutable record written once when the actor is created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActorMetadata {
    pub type_name: String,
    pub key: Vec<String>,
}
