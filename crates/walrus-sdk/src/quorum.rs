// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! The shard-weighted quorum dispatcher.
//!
//! All multi-node operations (metadata, slivers, statuses, writes) are fanned out through
//! [`dispatch`]: tasks complete concurrently under a sliding window, every completion updates
//! the shard-weighted tallies, and the dispatcher resolves as soon as one of the terminal
//! conditions holds, canceling the remaining work by dropping it.
//!
//! Completions are processed strictly one at a time, so the accept-and-count step is atomic:
//! a threshold of `k` accepted results yields exactly `k` results even when many tasks are in
//! flight.

use std::{collections::HashSet, future::Future, num::NonZeroU16};

use futures::{StreamExt, stream::FuturesUnordered};
use walrus_core::bft;

use crate::communication::NodeIndex;

/// Classification of a failed node interaction for the weighted tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The node authoritatively does not store the object.
    NotFound,
    /// The node refuses to serve the object (policy block).
    Blocked,
    /// The caller canceled the operation.
    UserAbort,
    /// Any other (transient) failure.
    Transient,
}

/// The decision of the caller-supplied acceptance rule after a successful task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep collecting results.
    Continue,
    /// The collected results are sufficient; stop early.
    Done,
}

/// A unit of work against a single storage node, weighted by the shards it contributes.
#[derive(Debug)]
pub struct NodeTask<Fut> {
    /// The committee index of the target node.
    pub node: NodeIndex,
    /// The shard weight this task contributes to the tallies.
    pub weight: usize,
    /// The future performing the interaction.
    pub future: Fut,
}

/// Configuration of a single dispatch.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// The total number of shards of the committee.
    pub n_shards: NonZeroU16,
    /// The accumulated success weight at which the dispatch completes.
    pub required_weight: usize,
    /// The maximum number of tasks in flight.
    pub n_concurrent: usize,
    /// If true, never keep more weight in flight than is still needed.
    ///
    /// Used for sliver reads, where every spare request is real load on a node.
    pub launch_only_needed: bool,
    /// If true, all queued tasks of a node are skipped once one of its tasks failed.
    pub blacklist_failed_nodes: bool,
    /// If true, only a single task is launched until the first completion is observed.
    ///
    /// Used for first-success operations (metadata): the fan-out starts only if the first
    /// randomly chosen node does not answer.
    pub slow_start: bool,
}

impl DispatchConfig {
    /// A configuration with the common defaults: plain fan-out at the given concurrency.
    pub fn new(n_shards: NonZeroU16, required_weight: usize, n_concurrent: usize) -> Self {
        Self {
            n_shards,
            required_weight,
            n_concurrent,
            launch_only_needed: false,
            blacklist_failed_nodes: false,
            slow_start: false,
        }
    }
}

/// A successful node interaction.
#[derive(Debug, Clone)]
pub struct NodeSuccess<T> {
    /// The committee index of the node.
    pub node: NodeIndex,
    /// The shard weight of the result.
    pub weight: usize,
    /// The returned value.
    pub value: T,
}

/// The aggregate outcome of a dispatch.
#[derive(Debug)]
pub enum DispatchOutcome<T> {
    /// Enough results were collected.
    Complete {
        /// The accepted results, in completion order.
        results: Vec<NodeSuccess<T>>,
        /// The accumulated success weight.
        weight: usize,
    },
    /// A quorum of shards authoritatively does not store the object.
    NotCertified,
    /// A quorum of shards does not serve the object, predominantly because it is blocked.
    Blocked,
    /// The caller canceled the operation.
    Aborted,
    /// The remaining tasks can no longer reach the required weight.
    Insufficient {
        /// The results collected so far, in completion order.
        results: Vec<NodeSuccess<T>>,
        /// The accumulated success weight.
        weight: usize,
    },
}

/// Dispatches the weighted tasks and aggregates their outcomes.
///
/// After every completion the dispatcher checks, in order: user abort, caller success (the
/// required weight is accumulated or `accept` returns [`Decision::Done`]), a not-found/blocked
/// quorum, and the optimistic exhaustion bound (the in-flight and queued weight can no longer
/// reach the required weight). Outstanding tasks are canceled by dropping them.
pub async fn dispatch<I, Fut, T, E>(
    config: &DispatchConfig,
    tasks: I,
    classify: impl Fn(&E) -> FailureClass,
    mut accept: impl FnMut(&NodeSuccess<T>) -> Decision,
) -> DispatchOutcome<T>
where
    I: IntoIterator<Item = NodeTask<Fut>>,
    Fut: Future<Output = Result<T, E>>,
{
    let mut queue = tasks.into_iter().collect::<Vec<_>>();
    queue.reverse();
    let mut queued_weight: usize = queue.iter().map(|task| task.weight).sum();

    let mut in_flight = FuturesUnordered::new();
    let mut in_flight_weight = 0usize;
    let mut any_completion = false;

    let mut results = Vec::new();
    let mut ok_weight = 0usize;
    let mut not_found_weight = 0usize;
    let mut blocked_weight = 0usize;
    let mut n_transient_errors = 0usize;
    let mut blacklist: HashSet<NodeIndex> = HashSet::new();

    loop {
        // Top up the sliding window, skipping nodes that are blacklisted.
        let window = if config.slow_start && !any_completion {
            1
        } else {
            config.n_concurrent
        };
        while in_flight.len() < window {
            let Some(task) = queue.pop() else {
                break;
            };
            queued_weight -= task.weight;
            if config.blacklist_failed_nodes && blacklist.contains(&task.node) {
                tracing::trace!(node = task.node, "skipping task of blacklisted node");
                continue;
            }
            if config.launch_only_needed
                && ok_weight + in_flight_weight >= config.required_weight
            {
                // Put the task back; it is only needed if an in-flight request fails.
                queued_weight += task.weight;
                queue.push(task);
                break;
            }
            in_flight_weight += task.weight;
            let NodeTask {
                node,
                weight,
                future,
            } = task;
            in_flight.push(async move { (node, weight, future.await) });
        }

        if ok_weight + in_flight_weight + queued_weight < config.required_weight {
            tracing::debug!(
                ok_weight,
                required_weight = config.required_weight,
                "remaining tasks cannot reach the required weight"
            );
            return DispatchOutcome::Insufficient {
                results,
                weight: ok_weight,
            };
        }

        let Some((node, weight, result)) = in_flight.next().await else {
            // Nothing in flight and nothing launchable: the queue only held blacklisted tasks.
            return DispatchOutcome::Insufficient {
                results,
                weight: ok_weight,
            };
        };
        any_completion = true;
        in_flight_weight -= weight;

        match result {
            Ok(value) => {
                ok_weight += weight;
                let success = NodeSuccess {
                    node,
                    weight,
                    value,
                };
                let decision = accept(&success);
                results.push(success);
                if decision == Decision::Done || ok_weight >= config.required_weight {
                    tracing::debug!(ok_weight, n_results = results.len(), "dispatch complete");
                    return DispatchOutcome::Complete {
                        results,
                        weight: ok_weight,
                    };
                }
            }
            Err(error) => {
                match classify(&error) {
                    FailureClass::UserAbort => return DispatchOutcome::Aborted,
                    FailureClass::NotFound => not_found_weight += weight,
                    FailureClass::Blocked => blocked_weight += weight,
                    FailureClass::Transient => n_transient_errors += 1,
                }
                if config.blacklist_failed_nodes {
                    blacklist.insert(node);
                }
                tracing::debug!(
                    node,
                    weight,
                    not_found_weight,
                    blocked_weight,
                    n_transient_errors,
                    "node task failed"
                );
                if bft::is_quorum(not_found_weight + blocked_weight, config.n_shards) {
                    // More than two thirds of the shard weight authoritatively has no data.
                    return if not_found_weight >= blocked_weight {
                        DispatchOutcome::NotCertified
                    } else {
                        DispatchOutcome::Blocked
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        NotFound,
        Blocked,
        Abort,
        Flaky,
    }

    fn classify(error: &TestError) -> FailureClass {
        match error {
            TestError::NotFound => FailureClass::NotFound,
            TestError::Blocked => FailureClass::Blocked,
            TestError::Abort => FailureClass::UserAbort,
            TestError::Flaky => FailureClass::Transient,
        }
    }

    fn n_shards(n: u16) -> NonZeroU16 {
        NonZeroU16::new(n).expect("positive")
    }

    fn continue_all<T>(_: &NodeSuccess<T>) -> Decision {
        Decision::Continue
    }

    /// One task per node; node `i` has weight `weights[i]` and produces `outcomes[i]`.
    fn tasks(
        outcomes: Vec<Result<u64, TestError>>,
        weights: Vec<usize>,
    ) -> Vec<NodeTask<impl Future<Output = Result<u64, TestError>>>> {
        outcomes
            .into_iter()
            .zip(weights)
            .enumerate()
            .map(|(node, (outcome, weight))| NodeTask {
                node,
                weight,
                future: async move { outcome },
            })
            .collect()
    }

    #[tokio::test]
    async fn completes_at_the_required_weight() {
        let config = DispatchConfig::new(n_shards(10), 7, 10);
        let outcome = dispatch(
            &config,
            tasks(vec![Ok(1); 10], vec![1; 10]),
            classify,
            continue_all,
        )
        .await;

        let DispatchOutcome::Complete { results, weight } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(weight, 7);
        assert_eq!(results.len(), 7);
    }

    #[tokio::test]
    async fn not_found_quorum_resolves_to_not_certified() {
        // 100 shards across 10 nodes; 7 nodes reply 404 (70 >= 67 is a quorum).
        let outcomes = (0..10)
            .map(|i| {
                if i < 7 {
                    Err(TestError::NotFound)
                } else {
                    Ok(0)
                }
            })
            .collect();
        let config = DispatchConfig::new(n_shards(100), 100, 10);
        let outcome = dispatch(
            &config,
            tasks(outcomes, vec![10; 10]),
            classify,
            continue_all,
        )
        .await;
        assert!(matches!(outcome, DispatchOutcome::NotCertified));
    }

    #[tokio::test]
    async fn blocked_majority_resolves_to_blocked() {
        // 40 shards blocked plus 28 not-found: total 68 is a quorum, blocked >= not-found.
        let outcomes = vec![
            Err(TestError::Blocked),
            Err(TestError::Blocked),
            Err(TestError::NotFound),
            Ok(0),
        ];
        let weights = vec![20, 20, 28, 32];
        let config = DispatchConfig {
            n_concurrent: 1,
            ..DispatchConfig::new(n_shards(100), 100, 1)
        };
        let outcome = dispatch(&config, tasks(outcomes, weights), classify, continue_all).await;
        assert!(matches!(outcome, DispatchOutcome::Blocked));
    }

    #[tokio::test]
    async fn exhaustion_is_detected_before_running_useless_tasks() {
        // Requires weight 5, but only 4 weight exists in total.
        let config = DispatchConfig::new(n_shards(10), 5, 2);
        let outcome = dispatch(
            &config,
            tasks(vec![Ok(1), Err(TestError::Flaky), Ok(1)], vec![2, 1, 1]),
            classify,
            continue_all,
        )
        .await;
        let DispatchOutcome::Insufficient { weight, .. } = outcome else {
            panic!("expected insufficiency");
        };
        assert!(weight <= 3);
    }

    #[tokio::test]
    async fn user_abort_preempts_everything() {
        let config = DispatchConfig::new(n_shards(10), 10, 1);
        let outcome = dispatch(
            &config,
            tasks(vec![Err(TestError::Abort), Ok(1)], vec![5, 5]),
            classify,
            continue_all,
        )
        .await;
        assert!(matches!(outcome, DispatchOutcome::Aborted));
    }

    #[tokio::test]
    async fn accept_done_stops_early() {
        let config = DispatchConfig::new(n_shards(10), 10, 1);
        let outcome = dispatch(
            &config,
            tasks(vec![Ok(7), Ok(8)], vec![1, 1]),
            classify,
            |success| {
                if success.value == 7 {
                    Decision::Done
                } else {
                    Decision::Continue
                }
            },
        )
        .await;
        let DispatchOutcome::Complete { results, .. } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value, 7);
    }

    #[tokio::test]
    async fn launch_only_needed_sends_exactly_the_required_requests() {
        let launched = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<_> = (0..40usize)
            .map(|node| {
                let launched = launched.clone();
                NodeTask {
                    node: node % 4,
                    weight: 1,
                    future: async move {
                        launched.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, TestError>(node as u64)
                    },
                }
            })
            .collect();

        let config = DispatchConfig {
            launch_only_needed: true,
            ..DispatchConfig::new(n_shards(100), 34, 10)
        };
        let outcome = dispatch(&config, tasks, classify, continue_all).await;

        let DispatchOutcome::Complete { results, .. } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(results.len(), 34);
        assert_eq!(launched.load(Ordering::SeqCst), 34);
    }

    #[tokio::test]
    async fn failed_nodes_are_blacklisted_for_their_remaining_tasks() {
        let attempts = Arc::new(AtomicUsize::new(0));
        // Node 0 has ten queued tasks and fails its first; nodes 1..=4 succeed.
        let mut all_tasks = Vec::new();
        for node in 0..5usize {
            for _ in 0..10 {
                let attempts = attempts.clone();
                all_tasks.push(NodeTask {
                    node,
                    weight: 1,
                    future: async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        if node == 0 {
                            Err(TestError::Flaky)
                        } else {
                            Ok(node as u64)
                        }
                    },
                });
            }
        }

        let config = DispatchConfig {
            blacklist_failed_nodes: true,
            ..DispatchConfig::new(n_shards(50), 40, 1)
        };
        let outcome = dispatch(&config, all_tasks, classify, continue_all).await;

        let DispatchOutcome::Complete { results, .. } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(results.len(), 40);
        // Node 0 was attempted exactly once before being blacklisted.
        assert_eq!(attempts.load(Ordering::SeqCst), 41);
    }

    #[tokio::test]
    async fn slow_start_launches_a_single_task_first() {
        let current = Arc::new(AtomicUsize::new(0));
        let first_task_concurrency = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<_> = (0..5usize)
            .map(|node| {
                let current = current.clone();
                let first_task_concurrency = first_task_concurrency.clone();
                NodeTask {
                    node,
                    weight: 1,
                    future: async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        if node == 0 {
                            first_task_concurrency.store(now, Ordering::SeqCst);
                        }
                        tokio::task::yield_now().await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        if node == 0 {
                            Err(TestError::Flaky)
                        } else {
                            Ok(node as u64)
                        }
                    },
                }
            })
            .collect();

        let config = DispatchConfig {
            slow_start: true,
            ..DispatchConfig::new(n_shards(5), 1, 5)
        };
        let outcome = dispatch(&config, tasks, classify, continue_all).await;
        assert!(matches!(outcome, DispatchOutcome::Complete { .. }));
        // The first task ran strictly alone; the fan-out started only after its failure.
        assert_eq!(first_task_concurrency.load(Ordering::SeqCst), 1);
    }
}
