use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use super::messages::Message;
use super::node::ConsensusNode;

/// The process-wide synchronous multiplexer: a FIFO queue of
/// `(node_id, Message)` pairs, fanned out to every registered node in
/// registration order.
///
/// The broker never holds a callback or a node reference. It only records
/// *which* node ids are registered, in what order, and what is queued for
/// them; the node table itself is owned by whoever drives the simulation
/// (see [`crate::simulation::Simulation`]) and is passed into `deliver_all`.
/// This sidesteps the cyclic-reference problem a callback-based broker would
/// have in an ownership-strict language (see Design Notes).
///
/// `Broker` is a cheap `Rc<RefCell<_>>` handle: every node holds a clone so
/// it can enqueue outgoing messages (`broadcast`/`send`) from inside its own
/// message handler, without re-entering a borrow still held by `deliver_all`.
#[derive(Clone)]
pub struct Broker {
    inner: Rc<RefCell<Inner>>,
}

struct Inner {
    registration_order: Vec<String>,
    registered: HashSet<String>,
    queue: VecDeque<(String, Message)>,
}

impl Broker {
    pub fn new() -> Self {
        Broker {
            inner: Rc::new(RefCell::new(Inner {
                registration_order: Vec::new(),
                registered: HashSet::new(),
                queue: VecDeque::new(),
            })),
        }
    }

    /// Record `node_id` as a broadcast target. Re-registration overwrites
    /// nothing observable here (the broker stores no handler), it simply
    /// leaves the node's original registration position untouched.
    pub fn register(&self, node_id: &str) {
        let mut inner = self.inner.borrow_mut();
        if inner.registered.insert(node_id.to_string()) {
            inner.registration_order.push(node_id.to_string());
        }
    }

    /// Enqueue `message` for every currently registered node, in
    /// registration order.
    pub fn broadcast(&self, message: impl Into<Message>) {
        let message = message.into();
        let mut inner = self.inner.borrow_mut();
        let targets = inner.registration_order.clone();
        for node_id in targets {
            inner.queue.push_back((node_id, message.clone()));
        }
    }

    /// Enqueue `message` for a single node.
    pub fn send(&self, node_id: &str, message: impl Into<Message>) {
        self.inner
            .borrow_mut()
            .queue
            .push_back((node_id.to_string(), message.into()));
    }

    /// Drain the queue against `nodes`, delivering to each recipient in
    /// strict FIFO order. Handlers invoked during the drain may enqueue
    /// further messages (by calling `broadcast`/`send` on their own cloned
    /// handle); those are delivered within the same drain cycle.
    ///
    /// Idempotent when the queue is empty.
    pub fn deliver_all(&self, nodes: &mut HashMap<String, ConsensusNode>) {
        loop {
            let next = self.inner.borrow_mut().queue.pop_front();
            let Some((node_id, message)) = next else {
                break;
            };
            if let Some(node) = nodes.get_mut(&node_id) {
                node.handle_message(message);
            }
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::keys::KeyManager;
    use crate::consensus::messages::Vote;
    use crate::consensus::node::PublicKeyRegistry;
    use std::collections::HashMap as StdHashMap;

    fn public_keys() -> PublicKeyRegistry {
        Rc::new(RefCell::new(StdHashMap::new()))
    }

    #[test]
    fn deliver_all_is_idempotent_on_empty_queue() {
        let broker = Broker::new();
        let mut nodes = StdHashMap::new();
        broker.deliver_all(&mut nodes);
        broker.deliver_all(&mut nodes);
    }

    #[test]
    fn broadcast_reaches_every_registered_node_in_order() {
        let broker = Broker::new();
        let keys = public_keys();
        let mut nodes = StdHashMap::new();
        for i in 0..3 {
            let node_id = i.to_string();
            let node = ConsensusNode::new(node_id.clone(), broker.clone(), keys.clone(), 3);
            broker.register(&node_id);
            nodes.insert(node_id, node);
        }

        let km = KeyManager::new();
        let vote = Vote {
            sender_id: "nobody".to_string(),
            epoch: 1,
            block_hash: "deadbeef".to_string(),
            block_bytes: vec![],
            signature: km.sign(b""),
            for_leader_id: None,
        };
        broker.broadcast(vote);
        // Draining against an unknown sender's vote is harmless: every node
        // rejects it (unknown signer) and the queue still empties.
        broker.deliver_all(&mut nodes);
    }
}
