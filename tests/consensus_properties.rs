use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use serde_json::json;
use streamlet_consensus::{Broker, ConsensusNode, PublicKeyRegistry, Simulation};

fn network(n: usize) -> (Broker, HashMap<String, ConsensusNode>) {
    let broker = Broker::new();
    let registry: PublicKeyRegistry = Rc::new(RefCell::new(HashMap::new()));
    let mut nodes = HashMap::new();
    for i in 0..n {
        let node_id = i.to_string();
        nodes.insert(
            node_id.clone(),
            ConsensusNode::new(node_id, broker.clone(), registry.clone(), n),
        );
    }
    (broker, nodes)
}

#[test]
fn happy_path_all_nodes_converge() {
    let mut sim = Simulation::new(4);
    sim.run(8, &HashSet::new());
    let logs = sim.finalized_logs();
    for log in &logs[1..] {
        assert_eq!(log, &logs[0]);
    }
    assert!(!logs[0].is_empty());
}

#[test]
fn suppressed_leader_keeps_nodes_in_agreement() {
    let mut happy = Simulation::new(4);
    happy.run(8, &HashSet::new());
    let happy_logs = happy.finalized_logs();

    let mut degraded = Simulation::new(4);
    degraded.run(8, &HashSet::from([5]));
    let degraded_logs = degraded.finalized_logs();

    for log in &degraded_logs[1..] {
        assert_eq!(log, &degraded_logs[0]);
    }
    assert!(degraded_logs[0].len() <= happy_logs[0].len());
}

#[test]
fn three_of_four_votes_notarize_the_block() {
    let (broker, mut nodes) = network(4);
    // Whichever node is leader for epoch 1 is the only one `propose` acts on;
    // calling it on every node avoids re-deriving the leader election rule
    // in the test itself.
    for node_id in ["0", "1", "2", "3"] {
        nodes.get_mut(node_id).unwrap().propose(1);
    }
    broker.deliver_all(&mut nodes);

    let hash = nodes["0"].chains()[0]
        .get(1)
        .cloned()
        .expect("the proposed block must be recorded on the chain");
    assert!(nodes["0"].notarized_blocks().contains(&hash));
    assert!(nodes["0"].votes_for(&hash) >= 3);
}

#[test]
fn finalized_transactions_trace_back_to_submitted_mempool_entries() {
    let mut sim = Simulation::new(4);
    sim.run(8, &HashSet::new());
    for log in sim.finalized_logs() {
        for transaction in log {
            let epoch = transaction["epoch"].as_u64().expect("epoch field present");
            let from: u64 = transaction["from"]
                .as_str()
                .expect("from field present")
                .parse()
                .expect("from field is a decimal node id");
            assert_eq!(transaction["val"], json!(10 * epoch + from));
        }
    }
}
