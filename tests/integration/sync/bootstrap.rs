//! Analysis discovery, bootstrap and teardown driven by peer edits.

use analyses_doc::config::SyncConfig;
use analyses_doc::doc::node;
use analyses_doc::test_harness::{EngineCall, ScriptedEngine};
use analyses_doc::{AnalysisOptions, AttrValue, DocumentStore};
use serde_json::json;

use crate::fixtures::peer::Peer;
use crate::fixtures::results::ttest_response;
use crate::fixtures::rig::{Rig, paths};

fn scripted() -> ScriptedEngine {
    let mut engine = ScriptedEngine::new();
    engine.script_results("ttest", ttest_response());
    engine
}

#[test]
fn peer_declared_analysis_is_created_and_rendered() {
    let mut rig = Rig::new(scripted());
    let mut peer = Peer::new();
    let options = AnalysisOptions::new().with("vars", json!(["len"]));
    let (id, _) = peer.add_analysis("ttest", &options);

    let report = rig.pull_from(&peer);
    assert!(report.failures.is_empty(), "{:?}", report.failures);

    let resource = rig.sync.resources().get(&id).expect("tracked");
    assert!(!resource.initializing);
    let doc = rig.sync.doc();
    assert_eq!(
        paths(doc, &resource.content_root),
        vec!["root:heading", "root:ttest", "root:plots:heading", "root:plots:desc"]
    );
    assert_eq!(
        doc.attribute(&resource.content_root, node::DIR),
        Some(AttrValue::from(node::LEFT_TO_RIGHT))
    );
    // Create, run; the bootstrap options echo never reached the document.
    let calls = rig.sync.engine().calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(&calls[0], EngineCall::Create { spec, .. } if spec.options == options));
    assert!(matches!(calls[1], EngineCall::Run(handle) if handle == resource.handle));
    // One bootstrap commit, one broadcast.
    assert_eq!(rig.publish_count(), 1);
}

#[test]
fn header_is_mirrored_onto_the_analysis_element() {
    let mut rig = Rig::new(scripted());
    let mut peer = Peer::new();
    let (id, _) = peer.add_analysis("ttest", &AnalysisOptions::new());
    rig.pull_from(&peer);

    let resource = rig.sync.resources().get(&id).expect("tracked");
    let doc = rig.sync.doc();
    assert_eq!(
        doc.attribute(&resource.element, node::INSTANCE_ID),
        Some(AttrValue::Int(i64::try_from(resource.handle.get()).unwrap()))
    );
    let details = match doc.attribute(&resource.element, node::DETAILS) {
        Some(AttrValue::Bytes(bytes)) => serde_json::from_slice::<serde_json::Value>(&bytes).unwrap(),
        other => panic!("missing details: {other:?}"),
    };
    assert_eq!(details["title"], json!("Independent Samples T-Test"));
    assert_eq!(details["status"], json!("complete"));
}

#[test]
fn removed_analysis_is_torn_down() {
    let mut rig = Rig::new(scripted());
    let mut peer = Peer::new();
    let (id, element) = peer.add_analysis("ttest", &AnalysisOptions::new());
    rig.pull_from(&peer);
    let handle = rig.sync.resources().get(&id).expect("tracked").handle;
    rig.push_to(&mut peer);

    peer.remove_analysis(&element);
    let report = rig.pull_from(&peer);

    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert!(!rig.sync.resources().contains(&id));
    assert!(rig.sync.engine().handles().is_empty());
    assert!(matches!(
        rig.sync.engine().calls().last(),
        Some(EngineCall::Remove(removed)) if *removed == handle
    ));
}

#[test]
fn teardown_can_be_disabled() {
    let settings = SyncConfig {
        teardown_removed: false,
        ..SyncConfig::default()
    };
    let mut rig = Rig::with_settings(scripted(), settings);
    let mut peer = Peer::new();
    let (id, element) = peer.add_analysis("ttest", &AnalysisOptions::new());
    rig.pull_from(&peer);
    rig.push_to(&mut peer);

    peer.remove_analysis(&element);
    rig.pull_from(&peer);

    assert!(rig.sync.resources().contains(&id));
    assert_eq!(rig.sync.engine().handles().len(), 1);
}

#[test]
fn analyses_under_a_custom_root_fragment_are_ignored_elsewhere() {
    let settings = SyncConfig {
        root_fragment: "body".to_string(),
        ..SyncConfig::default()
    };
    let mut rig = Rig::with_settings(scripted(), settings);
    let mut peer = Peer::new();
    peer.add_analysis("ttest", &AnalysisOptions::new());

    let report = rig.pull_from(&peer);

    assert!(report.failures.is_empty());
    assert!(rig.sync.resources().is_empty());
    assert!(rig.sync.engine().calls().is_empty());
}
