//! Scheduling cycle
//!
//! Runs every filter plugin and then the score plugin against each node,
//! one blocking task per node, and ranks the feasible nodes.

use scheduler_lib::{
    FilterPlugin, NodeInfoLister, Pod, SchedulerMetrics, ScorePlugin, Status, StructuredLogger,
};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::error;

/// Outcome of one node in a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResult {
    pub node: String,
    pub feasible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    /// Plugin that rejected or failed the node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleResult {
    pub pod: String,
    pub selected_node: Option<String>,
    pub nodes: Vec<NodeResult>,
}

#[derive(Clone)]
pub struct SchedulingCycle {
    filters: Vec<Arc<dyn FilterPlugin>>,
    scorer: Arc<dyn ScorePlugin>,
    node_infos: Arc<dyn NodeInfoLister>,
    metrics: SchedulerMetrics,
    logger: StructuredLogger,
}

impl SchedulingCycle {
    pub fn new(
        filters: Vec<Arc<dyn FilterPlugin>>,
        scorer: Arc<dyn ScorePlugin>,
        node_infos: Arc<dyn NodeInfoLister>,
        metrics: SchedulerMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            filters,
            scorer,
            node_infos,
            metrics,
            logger,
        }
    }

    /// Evaluate `pod` against every known node.
    ///
    /// Feasible nodes come first by descending score, ties by name; rejected
    /// and failed nodes follow by name. The first feasible node is selected.
    pub async fn run(&self, pod: Pod) -> ScheduleResult {
        let pod = Arc::new(pod);
        let mut tasks = JoinSet::new();

        for node in self.node_infos.node_names() {
            let cycle = self.clone();
            let pod = pod.clone();
            tasks.spawn_blocking(move || cycle.evaluate_node(&pod, node));
        }

        let mut nodes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => nodes.push(result),
                Err(err) => error!(pod = %pod.key(), error = %err, "Node evaluation task failed"),
            }
        }

        nodes.sort_by(|a, b| {
            (Reverse(a.feasible), Reverse(a.score), &a.node).cmp(&(
                Reverse(b.feasible),
                Reverse(b.score),
                &b.node,
            ))
        });

        ScheduleResult {
            pod: pod.key(),
            selected_node: nodes.first().filter(|n| n.feasible).map(|n| n.node.clone()),
            nodes,
        }
    }

    fn evaluate_node(&self, pod: &Pod, node: String) -> NodeResult {
        let pod_key = pod.key();

        for filter in &self.filters {
            let start = Instant::now();
            let status = filter.filter(pod, &node);
            self.metrics
                .observe_filter_latency(filter.name(), start.elapsed().as_secs_f64());

            if !status.is_success() {
                self.metrics.inc_node_rejections(filter.name());
                self.logger
                    .log_node_rejected(&pod_key, &node, filter.name(), &status.reasons);
                return NodeResult {
                    node,
                    feasible: false,
                    score: None,
                    plugin: Some(filter.name().to_string()),
                    status,
                };
            }
        }

        let start = Instant::now();
        let scored = self.scorer.score(pod, &node);
        self.metrics
            .observe_score_latency(self.scorer.name(), start.elapsed().as_secs_f64());

        match scored {
            Ok(score) => {
                self.logger.log_node_scored(&pod_key, &node, score);
                NodeResult {
                    node,
                    feasible: true,
                    score: Some(score),
                    plugin: None,
                    status: Status::success(),
                }
            }
            Err(err) => {
                self.metrics.inc_scoring_errors();
                self.logger
                    .log_scoring_error(&pod_key, &node, &err.to_string());
                NodeResult {
                    node,
                    feasible: false,
                    score: None,
                    plugin: Some(self.scorer.name().to_string()),
                    status: Status::error(err),
                }
            }
        }
    }
}
