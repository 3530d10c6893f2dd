use crate::error::RunError;
use crate::models::test_state::TestState;
use crate::report::ReportSink;
use crate::store::core::StoreContext;
use chrono::Utc;
use log::{error, info, warn};
use shared::center::CenterApi;
use shared::models::node::display_name;
use shared::models::SpeedtestResult;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    Finished(TestState),
    // A test triggered on its own was still in flight when the run got there
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub outcomes: Vec<(String, NodeOutcome)>,
}

impl RunSummary {
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|outcome| matches!(outcome, NodeOutcome::Finished(TestState::Success(_))))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, NodeOutcome::Finished(TestState::Error(_))))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, NodeOutcome::Skipped))
    }

    fn count(&self, predicate: impl Fn(&NodeOutcome) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| predicate(outcome))
            .count()
    }
}

struct RunAllGuard<'a>(&'a AtomicBool);

impl<'a> RunAllGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunAllGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// Hands a node's in-flight claim back if the test is dropped before its
// outcome is stored
struct InFlightClaim {
    store_context: Arc<StoreContext>,
    node_name: String,
    settled: bool,
}

impl InFlightClaim {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!(
            "Speedtest on node {} was cancelled",
            display_name(&self.node_name)
        );
        if self
            .store_context
            .test_state_store
            .try_abandon(&self.node_name)
        {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("No runtime to release node {}", self.node_name);
            return;
        };
        let store_context = self.store_context.clone();
        let node_name = std::mem::take(&mut self.node_name);
        runtime.spawn(async move {
            store_context.test_state_store.abandon(&node_name).await;
        });
    }
}

pub struct SpeedtestRunner {
    store_context: Arc<StoreContext>,
    center: Arc<dyn CenterApi>,
    test_delay: Duration,
    report_sink: Option<Arc<ReportSink>>,
    running_all: AtomicBool,
}

impl SpeedtestRunner {
    pub fn new(
        store_context: Arc<StoreContext>,
        center: Arc<dyn CenterApi>,
        test_delay: Duration,
        report_sink: Option<Arc<ReportSink>>,
    ) -> Self {
        Self {
            store_context,
            center,
            test_delay,
            report_sink,
            running_all: AtomicBool::new(false),
        }
    }

    pub fn is_running_all(&self) -> bool {
        self.running_all.load(Ordering::SeqCst)
    }

    /// Runs one speedtest on `node_name` and stores its outcome.
    ///
    /// The node is `Running` for the whole request. Fails only if a test on the
    /// same node is still in flight, in which case nothing is touched.
    pub async fn run_node_test(&self, node_name: &str) -> Result<TestState, RunError> {
        let test_state_store = &self.store_context.test_state_store;
        if !test_state_store.try_begin(node_name).await {
            return Err(RunError::AlreadyRunning(node_name.to_string()));
        }
        let claim = InFlightClaim {
            store_context: self.store_context.clone(),
            node_name: node_name.to_string(),
            settled: false,
        };

        info!("Starting speedtest on node {}", display_name(node_name));
        let result = match self.center.run_speedtest(node_name).await {
            Ok(result) => result,
            Err(e) => {
                error!("Speedtest request for node {node_name} failed: {e}");
                SpeedtestResult::connection_failure()
            }
        };

        let state = TestState::from_result(result, Utc::now());
        match &state {
            TestState::Success(_) => {
                info!("Speedtest on node {} finished: {state}", display_name(node_name));
            }
            _ => warn!("Speedtest on node {} failed: {state}", display_name(node_name)),
        }

        test_state_store.finish(node_name, state.clone()).await;
        claim.settle();

        if let (Some(report_sink), Some(test)) = (&self.report_sink, state.completed()) {
            if let Err(e) = report_sink.record(node_name, test).await {
                error!("Failed to write speedtest report: {e:#}");
            }
        }
        Ok(state)
    }

    pub async fn run_all_sequential(&self) -> Result<RunSummary, RunError> {
        self.run_all_sequential_with_progress(|_, _| {}).await
    }

    /// Tests every node of the current directory, one at a time.
    ///
    /// The node set is captured up front; nodes discovered later are left out
    /// and nodes that disappear are still tested. Each test is preceded by
    /// the configured delay. `on_node_done` sees every node's outcome in order.
    pub async fn run_all_sequential_with_progress<F>(
        &self,
        mut on_node_done: F,
    ) -> Result<RunSummary, RunError>
    where
        F: FnMut(&str, &NodeOutcome),
    {
        let Some(_guard) = RunAllGuard::acquire(&self.running_all) else {
            return Err(RunError::RunInProgress);
        };

        let node_names = self.store_context.directory_store.node_names().await;
        if node_names.is_empty() {
            info!("No nodes discovered, nothing to run");
            return Ok(RunSummary::default());
        }

        self.store_context
            .test_state_store
            .reset_for_run(&node_names)
            .await;
        info!(
            "Running speedtests on {} nodes sequentially",
            node_names.len()
        );

        let mut summary = RunSummary::default();
        for node_name in node_names {
            tokio::time::sleep(self.test_delay).await;
            let outcome = match self.run_node_test(&node_name).await {
                Ok(state) => NodeOutcome::Finished(state),
                Err(e) => {
                    warn!("Skipping node in sequential run: {e}");
                    NodeOutcome::Skipped
                }
            };
            on_node_done(&node_name, &outcome);
            summary.outcomes.push((node_name, outcome));
        }

        info!(
            "Sequential run finished: {} succeeded, {} failed, {} skipped",
            summary.succeeded(),
            summary.failed(),
            summary.skipped()
        );
        Ok(summary)
    }
}
