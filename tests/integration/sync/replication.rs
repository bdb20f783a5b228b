//! Server and peer replicas converge through `get_changes`/`apply_changes`.

use analyses_doc::doc::node;
use analyses_doc::test_harness::ScriptedEngine;
use analyses_doc::{AnalysisOptions, AnalysisResponse, DocumentStore, LoroDocument, NodeId};

use crate::fixtures::peer::Peer;
use crate::fixtures::results::{table, ttest_response};
use crate::fixtures::rig::{Rig, paths};

fn scripted() -> ScriptedEngine {
    let mut engine = ScriptedEngine::new();
    engine.script_results("ttest", ttest_response());
    engine
}

#[test]
fn peer_converges_on_rendered_results() {
    let mut rig = Rig::new(scripted());
    let mut peer = Peer::new();
    let (id, _) = peer.add_analysis("ttest", &AnalysisOptions::new());
    rig.pull_from(&peer);
    rig.push_to(&mut peer);

    let content = rig.content_root(&id);
    assert_eq!(paths(&peer.doc, &content), paths(rig.sync.doc(), &content));
    assert_eq!(
        peer.doc.children(&content).unwrap(),
        rig.sync.doc().children(&content).unwrap()
    );

    let handle = rig.sync.resources().get(&id).unwrap().handle;
    rig.sync.engine_mut().emit_results(
        handle,
        AnalysisResponse::complete("Independent Samples T-Test", vec![table("ttest", 3.0)]),
    );
    rig.sync.process_pending();
    rig.push_to(&mut peer);

    assert_eq!(paths(&peer.doc, &content), vec!["root:heading", "root:ttest"]);
    assert_eq!(
        peer.doc.encode_state_vector().unwrap(),
        rig.sync.doc().encode_state_vector().unwrap()
    );
}

#[test]
fn published_update_brings_a_peer_forward() {
    let mut rig = Rig::new(scripted());
    let mut peer = Peer::new();
    let (id, _) = peer.add_analysis("ttest", &AnalysisOptions::new());
    rig.pull_from(&peer);

    // The peer only ever sees what the server broadcast.
    let published = rig.published.borrow().clone();
    assert_eq!(published.len(), 1);
    peer.merge(&published[0].update);

    let content = rig.content_root(&id);
    assert_eq!(paths(&peer.doc, &content), paths(rig.sync.doc(), &content));
}

#[test]
fn remote_merges_are_not_rebroadcast() {
    let mut rig = Rig::new(scripted());
    let mut peer = Peer::new();
    let (_, element) = peer.add_analysis("ttest", &AnalysisOptions::new());
    rig.pull_from(&peer);
    let published = rig.publish_count();

    // A peer-only edit the server has nothing to add to.
    let txn = peer.doc.begin().unwrap();
    peer.doc
        .set_attribute(&txn, &element, "note", "checked".into())
        .unwrap();
    peer.doc.commit(txn).unwrap();
    let report = rig.pull_from(&peer);

    assert!(report.failures.is_empty());
    assert!(report.processed >= 1);
    assert_eq!(rig.publish_count(), published);
}

#[test]
fn concurrent_duplicate_is_swept_on_next_pass() {
    let mut rig = Rig::new(scripted());
    let mut peer = Peer::new();
    let (id, _) = peer.add_analysis("ttest", &AnalysisOptions::new());
    rig.pull_from(&peer);
    rig.push_to(&mut peer);
    let content: NodeId = rig.content_root(&id);

    // The peer renders its own copy of a result the server already owns.
    let at = peer.doc.children(&content).unwrap().len();
    let txn = peer.doc.begin().unwrap();
    let duplicate = peer
        .doc
        .insert_element(&txn, &content, at, node::RESULT_TAG)
        .unwrap();
    peer.doc
        .set_attribute(&txn, &duplicate, node::PATH, "root:ttest".into())
        .unwrap();
    peer.doc.commit(txn).unwrap();
    rig.pull_from(&peer);
    assert_eq!(paths(rig.sync.doc(), &content).len(), 5);

    let handle = rig.sync.resources().get(&id).unwrap().handle;
    rig.sync.engine_mut().emit_results(handle, ttest_response());
    let report = rig.sync.process_pending();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    rig.push_to(&mut peer);

    let expected = vec!["root:heading", "root:ttest", "root:plots:heading", "root:plots:desc"];
    assert_eq!(paths(rig.sync.doc(), &content), expected);
    assert_eq!(paths(&peer.doc, &content), expected);
    assert!(!peer.doc.children(&content).unwrap().contains(&duplicate));
}

#[test]
fn fresh_replica_catches_up_from_scratch() {
    let mut rig = Rig::new(scripted());
    let mut peer = Peer::new();
    let (id, _) = peer.add_analysis("ttest", &AnalysisOptions::new());
    rig.pull_from(&peer);

    let (vector, update) = rig.sync.get_changes(None).unwrap();
    let mut late = LoroDocument::new(3);
    late.apply_update(&update).unwrap();

    assert_eq!(late.encode_state_vector().unwrap(), vector);
    let content = rig.content_root(&id);
    assert_eq!(paths(&late, &content), paths(rig.sync.doc(), &content));
}
