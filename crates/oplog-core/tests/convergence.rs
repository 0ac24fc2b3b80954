//! Replicas that exchange entries in any order end up with the same log.
//!
//! Join must behave like a semilattice merge:
//!  - Commutativity: a ⊔ b = b ⊔ a
//!  - Associativity: (a ⊔ b) ⊔ c = a ⊔ (b ⊔ c)
//!  - Idempotence:  a ⊔ a = a

mod common;

use proptest::prelude::*;
use serde_json::json;

use oplog_core::{ordering, Log};
use oplog_types::BlockId;

use common::{payloads, Network};

fn hashes(log: &Log) -> Vec<BlockId> {
    log.iter().map(|e| e.hash()).collect()
}

fn merged(net: &Network, parts: &[&Log]) -> Log {
    let mut log = net.log("observer");
    for part in parts {
        log.join(part).unwrap();
    }
    log
}

fn assert_heads_invariant(log: &Log) {
    let entries = log.iter().map(|e| (e.hash(), e.clone())).collect();
    assert_eq!(log.head_hashes(), ordering::heads(&entries));
}

// ----------------------------------------------------------
// Scenarios
// ----------------------------------------------------------

#[tokio::test]
async fn third_parties_converge_regardless_of_join_order() {
    let net = Network::new();
    let mut a = net.log("userA");
    let mut b = net.log("userB");
    for i in 0..5 {
        a.append(json!(format!("a{i}"))).await.unwrap();
        b.append(json!(format!("b{i}"))).await.unwrap();
        if i == 2 {
            a.join(&b).unwrap();
        }
    }

    let mut c = net.log("userC");
    c.join(&a).unwrap();
    c.join(&b).unwrap();

    let mut d = net.log("userD");
    d.join(&b).unwrap();
    d.join(&a).unwrap();

    assert_eq!(hashes(&c), hashes(&d));
    assert_eq!(c.head_hashes(), d.head_hashes());
    assert_eq!(c.len(), 10);
    assert_heads_invariant(&c);
}

#[tokio::test]
async fn writers_keep_appending_after_exchanging() {
    let net = Network::new();
    let mut a = net.log("userA");
    let mut b = net.log("userB");

    for round in 0..4 {
        a.append(json!(format!("a{round}"))).await.unwrap();
        b.append(json!(format!("b{round}"))).await.unwrap();
        a.join(&b).unwrap();
        b.join(&a).unwrap();
        assert_eq!(hashes(&a), hashes(&b));
    }

    assert_eq!(
        payloads(&a),
        ["a0", "b0", "a1", "b1", "a2", "b2", "a3", "b3"]
    );
    assert_heads_invariant(&a);
}

#[tokio::test]
async fn reloaded_log_matches_its_source() {
    let net = Network::new();
    let mut a = net.log("userA");
    let mut b = net.log("userB");
    for i in 0..10 {
        if i % 3 == 0 {
            b.append(json!(i)).await.unwrap();
            a.join(&b).unwrap();
        } else {
            a.append(json!(i)).await.unwrap();
        }
    }

    let reference = a.to_reference().await.unwrap();
    let reloaded = Log::from_reference(net.ctx("userC"), reference, None)
        .await
        .unwrap();
    assert_eq!(hashes(&reloaded), hashes(&a));
    assert_eq!(reloaded.head_hashes(), a.head_hashes());
}

// ----------------------------------------------------------
// Properties
// ----------------------------------------------------------

/// One step of a random history: `writer` appends, or first syncs from
/// `source` and then appends.
#[derive(Debug, Clone)]
struct Step {
    writer: usize,
    sync_from: Option<usize>,
}

fn history_strategy() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(
        (0usize..3, prop::option::of(0usize..3)).prop_map(|(writer, sync_from)| Step {
            writer,
            sync_from,
        }),
        1..12,
    )
}

fn play(net: &Network, steps: &[Step]) -> Vec<Log> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    rt.block_on(async {
        let mut logs: Vec<Log> = ["w0", "w1", "w2"].iter().map(|w| net.log(w)).collect();
        for (i, step) in steps.iter().enumerate() {
            if let Some(source) = step.sync_from.filter(|s| *s != step.writer) {
                let (dst, src) = if step.writer < source {
                    let (lo, hi) = logs.split_at_mut(source);
                    (&mut lo[step.writer], &hi[0])
                } else {
                    let (lo, hi) = logs.split_at_mut(step.writer);
                    (&mut hi[0], &lo[source])
                };
                dst.join(src).unwrap();
            }
            logs[step.writer].append(json!(i)).await.unwrap();
        }
        logs
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn join_is_commutative(steps in history_strategy()) {
        let net = Network::new();
        let logs = play(&net, &steps);
        let ab = merged(&net, &[&logs[0], &logs[1]]);
        let ba = merged(&net, &[&logs[1], &logs[0]]);
        prop_assert_eq!(hashes(&ab), hashes(&ba));
        prop_assert_eq!(ab.head_hashes(), ba.head_hashes());
    }

    #[test]
    fn join_is_associative(steps in history_strategy()) {
        let net = Network::new();
        let logs = play(&net, &steps);
        let ab = merged(&net, &[&logs[0], &logs[1]]);
        let ab_c = merged(&net, &[&ab, &logs[2]]);
        let bc = merged(&net, &[&logs[1], &logs[2]]);
        let a_bc = merged(&net, &[&logs[0], &bc]);
        prop_assert_eq!(hashes(&ab_c), hashes(&a_bc));
    }

    #[test]
    fn join_is_idempotent(steps in history_strategy()) {
        let net = Network::new();
        let logs = play(&net, &steps);
        let mut a = merged(&net, &[&logs[0]]);
        let before = hashes(&a);
        let copy = merged(&net, &[&logs[0]]);
        let report = a.join(&copy).unwrap();
        prop_assert_eq!(report.added, 0);
        prop_assert_eq!(hashes(&a), before);
    }

    #[test]
    fn heads_are_exactly_the_unreferenced_entries(steps in history_strategy()) {
        let net = Network::new();
        let logs = play(&net, &steps);
        for log in &logs {
            assert_heads_invariant(log);
        }
        let all = merged(&net, &[&logs[0], &logs[1], &logs[2]]);
        assert_heads_invariant(&all);
    }

    #[test]
    fn values_respect_causality(steps in history_strategy()) {
        let net = Network::new();
        let logs = play(&net, &steps);
        let all = merged(&net, &[&logs[0], &logs[1], &logs[2]]);
        let position: std::collections::HashMap<BlockId, usize> =
            hashes(&all).into_iter().enumerate().map(|(i, h)| (h, i)).collect();
        for entry in all.iter() {
            for parent in entry.next() {
                prop_assert!(position[parent] < position[&entry.hash()]);
            }
        }
    }
}
