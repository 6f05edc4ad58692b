//! Report rendering: TSV for spreadsheets, JSON for tooling.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;

use crate::config::RunPlan;
use crate::harness::{CaseReport, IterationOutcome};

pub const TSV_HEADER: &str = "Case\tNodes\tDuration\tNodes/sec";

/// One summary line per pair, then a `#` line per raw iteration so the
/// slow first iteration stays visible next to the average.
pub fn render_tsv(reports: &[CaseReport]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{TSV_HEADER}");
    for report in reports {
        match (report.average(), report.nodes_per_second()) {
            (Some(avg), Some(rate)) => {
                let _ = writeln!(
                    out,
                    "{}\t{}\t{:.4}\t{:.0}",
                    report.label(),
                    report.case.node_count,
                    avg.as_secs_f64(),
                    rate
                );
            }
            _ => {
                let _ = writeln!(out, "{}\t{}\tFAILED\t-", report.label(), report.case.node_count);
            }
        }
    }
    for report in reports {
        for (i, outcome) in report.iterations.iter().enumerate() {
            let _ = match outcome {
                IterationOutcome::Measured { elapsed, .. } => writeln!(
                    out,
                    "#\t{}\t{}\t{:.4}",
                    report.label(),
                    i + 1,
                    elapsed.as_secs_f64()
                ),
                IterationOutcome::Failed { error } => {
                    writeln!(out, "#\t{}\t{}\tFAILED\t{error}", report.label(), i + 1)
                }
            };
        }
    }
    out
}

#[derive(Debug, Serialize)]
pub struct PairSummary<'a> {
    pub label: String,
    pub nodes: usize,
    pub avg_secs: Option<f64>,
    pub nodes_per_sec: Option<f64>,
    pub iteration_secs: Vec<Option<f64>>,
    #[serde(flatten)]
    pub report: &'a CaseReport,
}

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub store: &'a str,
    pub iterations: usize,
    pub batch_size: usize,
    pub max_batch_lines: Option<usize>,
    pub results: Vec<PairSummary<'a>>,
}

impl<'a> RunReport<'a> {
    pub fn new(store: &'a str, plan: &RunPlan, reports: &'a [CaseReport]) -> Self {
        Self {
            generated_at: Utc::now(),
            store,
            iterations: plan.iterations,
            batch_size: plan.bound.target,
            max_batch_lines: plan.bound.ceiling,
            results: reports
                .iter()
                .map(|report| PairSummary {
                    label: report.label(),
                    nodes: report.case.node_count,
                    avg_secs: report.average().map(|d| d.as_secs_f64()),
                    nodes_per_sec: report.nodes_per_second(),
                    iteration_secs: report
                        .iterations
                        .iter()
                        .map(|o| o.elapsed().map(|d| d.as_secs_f64()))
                        .collect(),
                    report,
                })
                .collect(),
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
