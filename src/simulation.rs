//! An in-crate collaborator for driving an epoch-by-epoch run of the
//! protocol: wires up a broker, a shared public key registry, and a set of
//! nodes, then advances epochs one at a time, delivering messages after
//! each. A runnable crate needs something to run; this is also exactly the
//! harness the integration tests use to exercise multi-node behavior.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde_json::json;

use crate::consensus::broker::Broker;
use crate::consensus::node::{expected_leader_for_epoch, ConsensusNode, PublicKeyRegistry};
use crate::consensus::Transaction;

/// A single-threaded run of `num_nodes` honest participants over a fixed
/// number of epochs, with zero or more epochs at which the leader's
/// proposal is suppressed (modeling a crashed or network-partitioned
/// leader).
pub struct Simulation {
    broker: Broker,
    nodes: HashMap<String, ConsensusNode>,
    num_nodes: usize,
}

impl Simulation {
    /// Build a fresh network of `num_nodes` nodes sharing one broker and one
    /// public key registry.
    pub fn new(num_nodes: usize) -> Self {
        let broker = Broker::new();
        let registry: PublicKeyRegistry = Rc::new(RefCell::new(HashMap::new()));
        let mut nodes = HashMap::new();
        for i in 0..num_nodes {
            let node_id = i.to_string();
            nodes.insert(
                node_id.clone(),
                ConsensusNode::new(node_id, broker.clone(), registry.clone(), num_nodes),
            );
        }
        Simulation {
            broker,
            nodes,
            num_nodes,
        }
    }

    /// Seed a synthetic transaction into every node's mempool for `epoch`,
    /// have the epoch's leader propose (unless `epoch` is in
    /// `suppressed_epochs`), then drain the broker. Mirrors the
    /// single-epoch step of a live deployment's scheduling loop.
    pub fn run_epoch(&mut self, epoch: u64, suppressed_epochs: &HashSet<u64>) {
        for i in 0..self.num_nodes as u64 {
            let node_id = i.to_string();
            self.nodes.get_mut(&node_id).unwrap().submit_transaction(json!({
                "epoch": epoch,
                "from": node_id,
                "val": epoch * 10 + i,
            }));
        }

        if !suppressed_epochs.contains(&epoch) {
            let leader = expected_leader_for_epoch(epoch, self.num_nodes);
            self.nodes.get_mut(&leader).unwrap().propose(epoch);
        }
        self.broker.deliver_all(&mut self.nodes);
    }

    /// Run `epochs` epochs starting at 1, draining the broker once more at
    /// the end to flush any messages still in flight.
    pub fn run(&mut self, epochs: u64, suppressed_epochs: &HashSet<u64>) {
        for epoch in 1..=epochs {
            self.run_epoch(epoch, suppressed_epochs);
        }
        self.broker.deliver_all(&mut self.nodes);
    }

    /// Each node's finalized transaction log, indexed by node id "0".."n-1".
    pub fn finalized_logs(&self) -> Vec<Vec<Transaction>> {
        (0..self.num_nodes)
            .map(|i| self.nodes[&i.to_string()].finalized_log().to_vec())
            .collect()
    }

    pub fn node(&self, node_id: &str) -> Option<&ConsensusNode> {
        self.nodes.get(node_id)
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }
}
