#![allow(dead_code)]

use analyses_doc::core::{Cell, Column, Table};
use analyses_doc::{AnalysisResponse, ResultElement, Visibility};

pub fn table(name: &str, value: f64) -> ResultElement {
    ResultElement::table(
        name,
        Table {
            columns: vec![Column {
                name: "stat".to_string(),
                title: "t".to_string(),
                cells: vec![Cell::number(value)],
            }],
            notes: Vec::new(),
        },
    )
}

/// Title, a descriptives table, and a conditional group holding one
/// hidden plot table.
pub fn ttest_response() -> AnalysisResponse {
    AnalysisResponse::complete(
        "Independent Samples T-Test",
        vec![
            table("ttest", 2.5),
            ResultElement::group(
                "plots",
                vec![table("desc", 1.0).with_visibility(Visibility::Hide)],
            )
            .titled("Plots")
            .with_visibility(Visibility::ShowIfNonEmpty),
        ],
    )
}
