//! Options flow in both directions without feeding back on itself.

use analyses_doc::doc::node;
use analyses_doc::test_harness::ScriptedEngine;
use analyses_doc::{AnalysisOptions, DocumentStore, Revision};
use serde_json::json;

use crate::fixtures::peer::Peer;
use crate::fixtures::rig::Rig;

#[test]
fn remote_edits_push_monotonic_revisions() {
    let mut rig = Rig::new(ScriptedEngine::new());
    let mut peer = Peer::new();
    let (id, element) = peer.add_analysis("ttest", &AnalysisOptions::new());
    rig.pull_from(&peer);
    let handle = rig.sync.resources().get(&id).expect("tracked").handle;

    let first = AnalysisOptions::new().with("ci", json!(true));
    let second = AnalysisOptions::new().with("ci", json!(false)).with("width", json!(95));
    peer.edit_options(&element, &first);
    rig.pull_from(&peer);
    peer.edit_options(&element, &second);
    rig.pull_from(&peer);

    let engine = rig.sync.engine();
    assert_eq!(
        engine.pushed_revisions(handle),
        vec![Revision::new(1), Revision::new(2)]
    );
    assert_eq!(engine.options(handle), Some(&second));
    assert_eq!(engine.revision(handle), Some(Revision::new(2)));
    assert_eq!(
        rig.sync.resources().get(&id).expect("tracked").revision,
        Revision::new(2)
    );
}

#[test]
fn pushed_options_echo_does_not_write_back() {
    let mut rig = Rig::new(ScriptedEngine::new());
    let mut peer = Peer::new();
    let (_, element) = peer.add_analysis("ttest", &AnalysisOptions::new());
    rig.pull_from(&peer);
    let published = rig.publish_count();

    peer.edit_options(&element, &AnalysisOptions::new().with("ci", json!(true)));
    let report = rig.pull_from(&peer);

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    // The engine echoed the options back; nothing was committed locally.
    assert_eq!(rig.publish_count(), published);
}

#[test]
fn engine_side_change_is_broadcast_once() {
    let mut rig = Rig::new(ScriptedEngine::new());
    let mut peer = Peer::new();
    let (id, _) = peer.add_analysis("ttest", &AnalysisOptions::new());
    rig.pull_from(&peer);
    rig.push_to(&mut peer);
    let handle = rig.sync.resources().get(&id).expect("tracked").handle;
    let published = rig.publish_count();

    let defaults = AnalysisOptions::new().with("ci", json!(true));
    rig.sync.engine_mut().emit_options(handle, defaults.clone());
    rig.sync.process_pending();
    rig.sync.engine_mut().emit_options(handle, defaults.clone());
    rig.sync.process_pending();

    assert_eq!(rig.publish_count(), published + 1);
    rig.push_to(&mut peer);
    let element = rig.sync.resources().get(&id).expect("tracked").element.clone();
    assert_eq!(
        node::stored_options_bytes(&peer.doc, &element),
        Some(defaults.encode().unwrap())
    );
}

#[test]
fn unreadable_options_are_retried_once_fixed() {
    let mut rig = Rig::new(ScriptedEngine::new());
    let mut peer = Peer::new();
    let (id, element) = peer.add_analysis("ttest", &AnalysisOptions::new());
    rig.pull_from(&peer);
    let handle = rig.sync.resources().get(&id).expect("tracked").handle;

    let txn = peer.doc.begin().unwrap();
    peer.doc
        .set_attribute(&txn, &element, node::OPTIONS, "0xnot-hex".into())
        .unwrap();
    peer.doc.commit(txn).unwrap();
    rig.pull_from(&peer);
    assert!(rig.sync.resources().get(&id).unwrap().needs_recompute);
    assert!(rig.sync.engine().pushed_revisions(handle).is_empty());

    let fixed = AnalysisOptions::new().with("ci", json!(true));
    peer.edit_options(&element, &fixed);
    rig.pull_from(&peer);

    let resource = rig.sync.resources().get(&id).unwrap();
    assert!(!resource.needs_recompute);
    assert_eq!(rig.sync.engine().options(handle), Some(&fixed));
}

#[test]
fn replaced_root_pushes_its_own_options() {
    let mut rig = Rig::new(ScriptedEngine::new());
    let mut peer = Peer::new();
    let (id, element) = peer.add_analysis("ttest", &AnalysisOptions::new());
    rig.pull_from(&peer);
    let handle = rig.sync.resources().get(&id).expect("tracked").handle;

    let pasted = AnalysisOptions::new().with("ci", json!(true)).with("width", json!(90));
    let replacement = peer.replace_analysis(&element, id, "ttest", &pasted);
    let report = rig.pull_from(&peer);

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    let resource = rig.sync.resources().get(&id).expect("still tracked");
    assert_eq!(resource.element, replacement);
    assert_eq!(resource.handle, handle);
    assert_eq!(rig.sync.resources().id_for_element(&replacement), Some(id));
    assert_eq!(rig.sync.resources().id_for_element(&element), None);

    let engine = rig.sync.engine();
    assert_eq!(engine.options(handle), Some(&pasted));
    assert_eq!(engine.pushed_revisions(handle), vec![Revision::new(1)]);
}
