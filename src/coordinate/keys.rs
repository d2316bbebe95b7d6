use crate::types::{ActorId, NodeId};

pub(crate) const DEFAULT_PREFIX: &str = "actor-coordinate:";

#[derive(Clone, Debug)]
pub(crate) struct Keys {
    prefix: String,
}

impl Keys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Keys { prefix: prefix.into() }
    }

    pub fn actor_metadata(&self, actor_id: &ActorId) -> String {
        format!("{}actor:{}:metadata", self.prefix, actor_id)
    }

    pub fn actor_lease(&self, actor_id: &ActorId) -> String {
        format!("{}actor:{}:lease:node", self.prefix, actor_id)
    }

    pub fn node_messages(&self, node_id: &NodeId) -> String {
        format!("{}node:{}:messages", self.prefix, node_id)
    }
}

impl Default for Keys {
    fn default() -> Self {
        Keys::new(DEFAULT_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        let keys = Keys::default();
        assert_eq!(keys.actor_metadata(&"a1".into()), "actor-coordinate:actor:a1:metadata");
        assert_eq!(keys.actor_lease(&"a1".into()), "actor-coordinate:actor:a1:lease:node");
        assert_eq!(keys.node_messages(&"n1".into()), "actor-coordinate:node:n1:messages");
    }
}
