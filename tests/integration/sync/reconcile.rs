//! Reconciliation of engine results into the analysis content fragment.

use analyses_doc::doc::node;
use analyses_doc::sync::SyncError;
use analyses_doc::test_harness::ScriptedEngine;
use analyses_doc::{
    AnalysesDoc, AnalysisHandle, AnalysisId, AnalysisOptions, AnalysisResponse, AttrValue,
    DocumentStore, LoroDocument, ResultElement, Visibility,
};
use serde_json::json;

use crate::fixtures::peer::Peer;
use crate::fixtures::results::{table, ttest_response};
use crate::fixtures::rig::{Rig, child_with_path, paths, payload};

fn bootstrapped() -> (Rig, AnalysisId, AnalysisHandle) {
    let mut engine = ScriptedEngine::new();
    engine.script_results("ttest", ttest_response());
    let mut rig = Rig::new(engine);
    let mut peer = Peer::new();
    let (id, _) = peer.add_analysis("ttest", &AnalysisOptions::new());
    rig.pull_from(&peer);
    let handle = rig.sync.resources().get(&id).expect("tracked").handle;
    (rig, id, handle)
}

fn deliver(
    sync: &mut AnalysesDoc<LoroDocument, ScriptedEngine>,
    handle: AnalysisHandle,
    response: AnalysisResponse,
) {
    sync.engine_mut().emit_results(handle, response);
    let report = sync.process_pending();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
}

#[test]
fn unchanged_results_commit_nothing() {
    let (mut rig, id, handle) = bootstrapped();
    let before = rig.sync.doc().encode_state_vector().unwrap();
    let published = rig.publish_count();

    deliver(&mut rig.sync, handle, ttest_response());
    deliver(&mut rig.sync, handle, ttest_response());

    assert_eq!(rig.sync.doc().encode_state_vector().unwrap(), before);
    assert_eq!(rig.publish_count(), published);
    let resource = rig.sync.resources().get(&id).unwrap();
    assert_eq!(resource.items.len(), 4);
}

#[test]
fn hidden_only_child_collapses_its_heading() {
    let (rig, id, _) = bootstrapped();
    let doc = rig.sync.doc();
    let content = rig.content_root(&id);

    let heading = child_with_path(doc, &content, "root:plots:heading").expect("heading");
    assert_eq!(doc.attribute(&heading, node::VISIBLE), Some(AttrValue::Bool(false)));
    assert_eq!(doc.attribute(&heading, node::TAG), Some(AttrValue::from("h2")));
    let desc = child_with_path(doc, &content, "root:plots:desc").expect("desc");
    assert_eq!(payload(doc, &desc)["visible"], json!("hide"));
    let ttest = child_with_path(doc, &content, "root:ttest").expect("ttest");
    assert_eq!(payload(doc, &ttest)["visible"], json!("show"));

    let title = child_with_path(doc, &content, "root:heading").expect("title");
    assert_eq!(doc.attribute(&title, node::TAG), Some(AttrValue::from("h1")));
    assert_eq!(
        doc.attribute(&title, node::DEFAULT_VALUE),
        Some(AttrValue::from("Independent Samples T-Test"))
    );
}

#[test]
fn revealed_child_reopens_its_heading_in_place() {
    let (mut rig, id, handle) = bootstrapped();
    let content = rig.content_root(&id);
    let heading = child_with_path(rig.sync.doc(), &content, "root:plots:heading").unwrap();

    let revealed = AnalysisResponse::complete(
        "Independent Samples T-Test",
        vec![
            table("ttest", 2.5),
            ResultElement::group("plots", vec![table("desc", 1.0)])
                .titled("Plots")
                .with_visibility(Visibility::ShowIfNonEmpty),
        ],
    );
    deliver(&mut rig.sync, handle, revealed);

    let doc = rig.sync.doc();
    assert_eq!(
        child_with_path(doc, &content, "root:plots:heading"),
        Some(heading.clone())
    );
    assert_eq!(doc.attribute(&heading, node::VISIBLE), Some(AttrValue::Bool(true)));
    let desc = child_with_path(doc, &content, "root:plots:desc").unwrap();
    assert_eq!(payload(doc, &desc)["visible"], json!("show_if_non_empty"));
}

#[test]
fn dropped_elements_are_swept() {
    let (mut rig, id, handle) = bootstrapped();
    let content = rig.content_root(&id);
    let kept = child_with_path(rig.sync.doc(), &content, "root:ttest").unwrap();

    deliver(
        &mut rig.sync,
        handle,
        AnalysisResponse::complete("Independent Samples T-Test", vec![table("ttest", 2.5)]),
    );

    let doc = rig.sync.doc();
    assert_eq!(paths(doc, &content), vec!["root:heading", "root:ttest"]);
    assert_eq!(child_with_path(doc, &content, "root:ttest"), Some(kept));
    let resource = rig.sync.resources().get(&id).unwrap();
    assert_eq!(resource.items.len(), 2);
    let indexes: Vec<usize> = resource.items_in_order().iter().map(|item| item.index).collect();
    assert_eq!(indexes, vec![0, 1]);
}

#[test]
fn new_element_lands_after_its_predecessor() {
    let (mut rig, id, handle) = bootstrapped();
    let content = rig.content_root(&id);

    deliver(
        &mut rig.sync,
        handle,
        AnalysisResponse::complete(
            "Independent Samples T-Test",
            vec![
                table("ttest", 2.5),
                table("effect", 0.4),
                ResultElement::group(
                    "plots",
                    vec![table("desc", 1.0).with_visibility(Visibility::Hide)],
                )
                .titled("Plots")
                .with_visibility(Visibility::ShowIfNonEmpty),
            ],
        ),
    );

    assert_eq!(
        paths(rig.sync.doc(), &content),
        vec![
            "root:heading",
            "root:ttest",
            "root:effect",
            "root:plots:heading",
            "root:plots:desc"
        ]
    );
}

#[test]
fn conflicting_names_write_nothing() {
    let (mut rig, id, handle) = bootstrapped();
    let before = rig.sync.doc().encode_state_vector().unwrap();
    let published = rig.publish_count();

    rig.sync.engine_mut().emit_results(
        handle,
        AnalysisResponse::complete("T", vec![table("dup", 1.0), table("dup", 2.0)]),
    );
    let report = rig.sync.process_pending();

    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        &report.failures[0],
        SyncError::IdentityConflict { analysis, path } if *analysis == id && path.as_str() == "root:dup"
    ));
    assert_eq!(rig.sync.doc().encode_state_vector().unwrap(), before);
    assert_eq!(rig.publish_count(), published);
    assert!(!rig.sync.doc().in_transaction());
}
