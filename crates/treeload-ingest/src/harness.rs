//! Benchmark harness.
//!
//! For each (strategy, case) pair the harness cycles through
//! `Idle -> Reset -> Ingesting -> Measured -> (Reset | Done)` once per
//! iteration:
//!
//! - **Reset** (untimed): `reset_state`, plus the `id` constraints for
//!   strategies that match on it.
//! - **Ingesting**: one session; every batch in order. The clock starts right
//!   before the first submission and stops after the last.
//! - **Measured**: the elapsed time is recorded.
//!
//! A store error fails only its own iteration. A boundary violation fails
//! every remaining iteration of the pair, since re-rendering would hit it
//! again. Failed iterations are reported but never averaged.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use treeload_model::{load_snapshot, synthesize, Case, EntityKind, EntityTree, KindCounts};
use treeload_store::{GraphStore, StoreSession};

use crate::assembler::BatchBound;
use crate::config::{FixtureSource, RunPlan};
use crate::strategy::Strategy;
use crate::{IngestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Reset,
    Ingesting,
    Measured,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IterationOutcome {
    Measured { elapsed: Duration, batches: usize },
    Failed { error: String },
}

impl IterationOutcome {
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            IterationOutcome::Measured { elapsed, .. } => Some(*elapsed),
            IterationOutcome::Failed { .. } => None,
        }
    }
}

/// Post-run cardinality check. Mismatches are diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub expected: KindCounts,
    pub observed: KindCounts,
    pub edges: usize,
    pub mismatches: Vec<String>,
}

impl Validation {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseReport {
    pub strategy: Strategy,
    pub case: &'static Case,
    pub iterations: Vec<IterationOutcome>,
    pub validation: Option<Validation>,
}

impl CaseReport {
    /// `i2_case_100`
    pub fn label(&self) -> String {
        format!("{}_{}", self.strategy.label(), self.case.name)
    }

    pub fn measured(&self) -> impl Iterator<Item = Duration> + '_ {
        self.iterations.iter().filter_map(IterationOutcome::elapsed)
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.iterations
            .iter()
            .enumerate()
            .filter_map(|(i, outcome)| match outcome {
                IterationOutcome::Failed { error } => Some((i + 1, error.as_str())),
                IterationOutcome::Measured { .. } => None,
            })
    }

    /// Mean over successful iterations only.
    pub fn average(&self) -> Option<Duration> {
        let (count, total) = self
            .measured()
            .fold((0u32, Duration::ZERO), |(n, sum), d| (n + 1, sum + d));
        (count > 0).then(|| total / count)
    }

    /// Registered node count over the average time.
    pub fn nodes_per_second(&self) -> Option<f64> {
        let secs = self.average()?.as_secs_f64();
        if secs <= 0.0 {
            return Some(f64::INFINITY);
        }
        Some(self.case.node_count as f64 / secs)
    }
}

/// Build the tree for `case` from the configured source.
pub fn load_fixture(source: &FixtureSource, case: &Case) -> Result<EntityTree> {
    let tree = match source {
        FixtureSource::Synthetic { seed } => synthesize(case, *seed)?,
        FixtureSource::SnapshotDir { dir } => {
            load_snapshot(&dir.join(format!("{}.json", case.name)))?
        }
    };
    let counts = tree.count();
    if counts != case.counts() {
        warn!(
            case = case.name,
            directories = counts.directories,
            files = counts.files,
            "fixture counts differ from the registered case"
        );
    }
    Ok(tree)
}

pub struct Harness<'s, S> {
    store: &'s mut S,
    phase: Phase,
}

impl<'s, S: GraphStore> Harness<'s, S> {
    pub fn new(store: &'s mut S) -> Self {
        Self {
            store,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }

    /// Run every (strategy, case) pair of the plan. Every case's tree is
    /// built before the store is touched, once, and shared by all strategies.
    /// Reports come back grouped by strategy, in plan order.
    pub fn run(&mut self, plan: &RunPlan) -> Result<Vec<CaseReport>> {
        let fixtures = plan
            .cases
            .iter()
            .map(|&case| Ok((case, load_fixture(&plan.fixture, case)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut reports = Vec::with_capacity(plan.strategies.len() * plan.cases.len());
        for (case, tree) in &fixtures {
            for &strategy in &plan.strategies {
                reports.push(self.run_case(strategy, *case, tree, plan));
            }
        }
        reports.sort_by_key(|r| {
            plan.strategies
                .iter()
                .position(|s| *s == r.strategy)
                .unwrap_or(usize::MAX)
        });
        Ok(reports)
    }

    /// All iterations of one pair, then optional validation.
    pub fn run_case(
        &mut self,
        strategy: Strategy,
        case: &'static Case,
        tree: &EntityTree,
        plan: &RunPlan,
    ) -> CaseReport {
        let label = format!("{}_{}", strategy.label(), case.name);
        let mut iterations = Vec::with_capacity(plan.iterations);
        let mut fatal: Option<String> = None;

        for i in 1..=plan.iterations {
            if let Some(error) = &fatal {
                iterations.push(IterationOutcome::Failed {
                    error: error.clone(),
                });
                continue;
            }
            let outcome = match self.iteration(strategy, tree, plan.bound) {
                Ok((elapsed, batches)) => {
                    debug!(
                        %label,
                        iteration = i,
                        secs = elapsed.as_secs_f64(),
                        batches,
                        "measured"
                    );
                    IterationOutcome::Measured { elapsed, batches }
                }
                Err(err) => {
                    warn!(%label, iteration = i, error = %err, "iteration failed");
                    if matches!(err, IngestError::BoundaryViolation { .. }) {
                        fatal = Some(err.to_string());
                    }
                    IterationOutcome::Failed {
                        error: err.to_string(),
                    }
                }
            };
            iterations.push(outcome);
        }

        let validation = if plan.validate {
            self.validate(case)
        } else {
            None
        };
        self.enter(Phase::Done);

        let report = CaseReport {
            strategy,
            case,
            iterations,
            validation,
        };
        match report.average() {
            Some(avg) => info!(
                %label,
                nodes = case.node_count,
                avg_secs = avg.as_secs_f64(),
                nodes_per_sec = report.nodes_per_second().unwrap_or_default(),
                "case done"
            ),
            None => warn!(%label, "no successful iteration"),
        }
        report
    }

    /// One reset + ingest cycle: `(elapsed, batches submitted)`.
    pub fn iteration(
        &mut self,
        strategy: Strategy,
        tree: &EntityTree,
        bound: BatchBound,
    ) -> Result<(Duration, usize)> {
        self.enter(Phase::Reset);
        self.store.reset_state()?;
        if strategy.requires_constraints() {
            self.store.ensure_constraints(&EntityKind::ALL)?;
        }

        self.enter(Phase::Ingesting);
        let mut session = self.store.open_session()?;
        let mut started: Option<Instant> = None;
        let mut submitted = 0;
        for batch in strategy.render(tree, bound) {
            let batch = batch?;
            started.get_or_insert_with(Instant::now);
            session.execute(&batch)?;
            submitted += 1;
        }
        let elapsed = started.map(|t| t.elapsed()).unwrap_or_default();
        drop(session);

        self.enter(Phase::Measured);
        Ok((elapsed, submitted))
    }

    fn validate(&mut self, case: &Case) -> Option<Validation> {
        let counts = self
            .store
            .count_by_kind()
            .and_then(|kinds| Ok((kinds, self.store.count_edges()?)));
        let (observed, edges) = match counts {
            Ok(counts) => counts,
            Err(err) => {
                warn!(case = case.name, error = %err, "validation query failed");
                return None;
            }
        };

        let expected = case.counts();
        let mut mismatches = Vec::new();
        for kind in EntityKind::ALL {
            if observed.get(kind) != expected.get(kind) {
                mismatches.push(format!(
                    "{kind}: expected {}, found {}",
                    expected.get(kind),
                    observed.get(kind)
                ));
            }
        }
        if observed == expected && edges + 1 != expected.total() {
            mismatches.push(format!(
                "{}: expected {}, found {edges}",
                treeload_model::PARENT_OF,
                expected.total().saturating_sub(1)
            ));
        }
        for mismatch in &mismatches {
            warn!(case = case.name, "validation mismatch: {mismatch}");
        }
        Some(Validation {
            expected,
            observed,
            edges,
            mismatches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BenchConfig;
    use treeload_store::MemoryGraph;

    fn plan(strategies: &[&str], iterations: usize) -> RunPlan {
        BenchConfig {
            strategies: strategies.iter().map(|s| s.to_string()).collect(),
            iterations,
            batch_size: 100,
            validate: true,
            ..BenchConfig::default()
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn test_every_strategy_validates_on_memory_store() {
        let mut store = MemoryGraph::new();
        let plan = plan(&["1", "2", "4", "6"], 2);
        let reports = Harness::new(&mut store).run(&plan).unwrap();
        assert_eq!(reports.len(), 4);
        for report in &reports {
            assert_eq!(report.measured().count(), 2, "{}", report.label());
            let validation = report.validation.as_ref().unwrap();
            assert!(validation.passed(), "{}: {:?}", report.label(), validation);
            assert_eq!(validation.edges, 96);
        }
    }

    #[test]
    fn test_store_error_fails_only_its_iteration() {
        let mut store = MemoryGraph::new();
        // Gulp submits one batch per iteration: fail the second one.
        store.fail_on_execute(2);
        let plan = plan(&["gulp"], 3);
        let reports = Harness::new(&mut store).run(&plan).unwrap();
        let report = &reports[0];
        assert_eq!(report.measured().count(), 2);
        assert_eq!(report.failures().map(|(i, _)| i).collect::<Vec<_>>(), vec![2]);
        assert!(report.average().is_some());
    }

    #[test]
    fn test_boundary_violation_fails_remaining_iterations() {
        let mut store = MemoryGraph::new();
        let mut plan = plan(&["bounded"], 3);
        plan.bound = BatchBound::soft(100).with_ceiling(1);
        let mut harness = Harness::new(&mut store);
        let reports = harness.run(&plan).unwrap();
        assert_eq!(harness.phase(), Phase::Done);
        let report = &reports[0];
        assert_eq!(report.failures().count(), 3);
        assert!(report.average().is_none());
        assert!(report.nodes_per_second().is_none());
    }

    #[test]
    fn test_reports_grouped_by_strategy() {
        let mut store = MemoryGraph::new();
        let mut plan = plan(&["merge", "gulp"], 1);
        plan.cases.push(treeload_model::find_case("1750").unwrap());
        let reports = Harness::new(&mut store).run(&plan).unwrap();
        let labels: Vec<String> = reports.iter().map(CaseReport::label).collect();
        assert_eq!(
            labels,
            vec!["i4_case_100", "i4_case_1750", "i1_case_100", "i1_case_1750"]
        );
    }

    #[test]
    fn test_missing_snapshot_aborts_before_store_work() {
        let mut store = MemoryGraph::new();
        let mut plan = plan(&["gulp"], 1);
        plan.fixture = FixtureSource::SnapshotDir {
            dir: "/no/such/dir".into(),
        };
        assert!(matches!(
            Harness::new(&mut store).run(&plan),
            Err(IngestError::Model(_))
        ));
    }

    #[test]
    fn test_missing_later_snapshot_aborts_before_store_work() {
        let dir = tempfile::tempdir().unwrap();
        let first = treeload_model::find_case("100").unwrap();
        let tree = synthesize(first, 3).unwrap();
        treeload_model::save_snapshot(&tree, &dir.path().join("case_100.json")).unwrap();

        let mut store = MemoryGraph::new();
        let mut plan = plan(&["gulp"], 1);
        plan.cases.push(treeload_model::find_case("1750").unwrap());
        plan.fixture = FixtureSource::SnapshotDir {
            dir: dir.path().to_path_buf(),
        };
        assert!(matches!(
            Harness::new(&mut store).run(&plan),
            Err(IngestError::Model(_))
        ));
        assert_eq!(store.census().directories + store.census().files, 0);
    }
}
