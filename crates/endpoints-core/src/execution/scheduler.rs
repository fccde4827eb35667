//! Task dependency scheduler.
//!
//! Tasks are wired to each other through intermediate value names: a task is
//! ready once every value it requires has a registered producer. The graph is
//! checked with a topological sort before anything is submitted, then tasks
//! are submitted in declaration-ordered sweeps. A task's outputs are
//! registered against its `SyncPoint` as soon as it is submitted, so consumers
//! are wired to wait on it before it has finished.

use std::collections::HashMap;
use std::future::Future;

use endpoints_types::endpoint::TaskDefinition;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use crate::error::{EngineError, SchedulingError};

use super::executor::{SyncPoint, TaskExecutor};

/// Check that every required value has exactly one producer and that the
/// value dependencies among `tasks` are acyclic.
pub fn check_graph(
    tasks: &[TaskDefinition],
    terminal_name: &str,
    terminal_inputs: &[String],
) -> Result<(), SchedulingError> {
    let mut producers: HashMap<String, usize> = HashMap::new();
    for (idx, task) in tasks.iter().enumerate() {
        for output in task.output_intermediate_values() {
            if let Some(&first) = producers.get(&output) {
                return Err(SchedulingError::DuplicateProducer {
                    value: output,
                    first: tasks[first].name.clone(),
                    second: task.name.clone(),
                });
            }
            producers.insert(output, idx);
        }
    }

    // Edge from producer -> consumer
    let mut graph = DiGraph::<&str, ()>::new();
    let nodes: Vec<_> = tasks.iter().map(|t| graph.add_node(t.name.as_str())).collect();

    for (idx, task) in tasks.iter().enumerate() {
        for input in &task.input_intermediate_values {
            let producer = producers.get(input).ok_or_else(|| {
                SchedulingError::UnknownIntermediateValue {
                    consumer: task.name.clone(),
                    value: input.clone(),
                }
            })?;
            graph.add_edge(nodes[*producer], nodes[idx], ());
        }
    }

    if let Some(missing) = terminal_inputs.iter().find(|v| !producers.contains_key(*v)) {
        return Err(SchedulingError::UnknownIntermediateValue {
            consumer: terminal_name.to_string(),
            value: missing.clone(),
        });
    }

    toposort(&graph, None).map_err(|cycle| {
        SchedulingError::CycleDetected(graph[cycle.node_id()].to_string())
    })?;

    Ok(())
}

fn predecessors(registered: &HashMap<String, SyncPoint>, inputs: &[String]) -> Vec<SyncPoint> {
    let mut deps: Vec<SyncPoint> = Vec::new();
    for input in inputs {
        if let Some(point) = registered.get(input) {
            if !deps.contains(point) {
                deps.push(point.clone());
            }
        }
    }
    deps
}

/// Submit `tasks` and then the terminal consumer to `executor`.
///
/// `make_work` is called once per task, in submission order. Returns the
/// terminal consumer's `SyncPoint`. Fails before submitting anything if the
/// graph is defective.
pub fn schedule_graph<M, W, T>(
    executor: &TaskExecutor,
    tasks: &[TaskDefinition],
    terminal_name: &str,
    terminal_inputs: &[String],
    mut make_work: M,
    terminal_work: T,
) -> Result<SyncPoint, SchedulingError>
where
    M: FnMut(&TaskDefinition) -> W,
    W: Future<Output = Result<(), EngineError>> + Send + 'static,
    T: Future<Output = Result<(), EngineError>> + Send + 'static,
{
    check_graph(tasks, terminal_name, terminal_inputs)?;

    let mut registered: HashMap<String, SyncPoint> = HashMap::new();
    let mut remaining: Vec<&TaskDefinition> = tasks.iter().collect();
    let mut sweep = 0usize;

    while !remaining.is_empty() {
        sweep += 1;
        let (ready, blocked): (Vec<&TaskDefinition>, Vec<&TaskDefinition>) =
            remaining.into_iter().partition(|task| {
                task.input_intermediate_values
                    .iter()
                    .all(|input| registered.contains_key(input))
            });

        if ready.is_empty() {
            // Unreachable after check_graph; kept so a defect can never spin.
            let stuck = blocked.first().map(|t| t.name.clone()).unwrap_or_default();
            return Err(SchedulingError::CycleDetected(stuck));
        }

        tracing::debug!(
            executor = executor.label(),
            sweep,
            ready = ready.len(),
            blocked = blocked.len(),
            "scheduling sweep"
        );

        for task in ready {
            let deps = predecessors(&registered, &task.input_intermediate_values);
            let point = executor.schedule(task.name.clone(), deps, make_work(task));
            for output in task.output_intermediate_values() {
                registered.insert(output, point.clone());
            }
        }
        remaining = blocked;
    }

    let deps = predecessors(&registered, terminal_inputs);
    Ok(executor.schedule(terminal_name.to_string(), deps, terminal_work))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use endpoints_types::endpoint::TaskKind;

    use crate::execution::values::IntermediateValues;

    fn task(name: &str, inputs: &[&str], output: &str) -> TaskDefinition {
        TaskDefinition {
            name: name.to_string(),
            input_intermediate_values: inputs.iter().map(|s| s.to_string()).collect(),
            kind: TaskKind::IntermediateValue {
                output: output.to_string(),
                pattern: String::new(),
            },
        }
    }

    fn names(inputs: &[&str]) -> Vec<String> {
        inputs.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_consumer_submitted_after_producer() {
        // Declared consumer-first; the producer must still be submitted first.
        let tasks = vec![task("b", &["a_out"], "b_out"), task("a", &[], "a_out")];
        let executor = TaskExecutor::new("test", 4);
        let submitted = Arc::new(Mutex::new(Vec::new()));

        let s = submitted.clone();
        schedule_graph(
            &executor,
            &tasks,
            "response",
            &names(&["b_out"]),
            move |t| {
                s.lock().unwrap().push(t.name.clone());
                async { Ok(()) }
            },
            async { Ok(()) },
        )
        .unwrap();

        executor.run().await.unwrap();
        assert_eq!(*submitted.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_three_cycle_is_rejected_before_execution() {
        let tasks = vec![
            task("a", &["b_out"], "a_out"),
            task("b", &["c_out"], "b_out"),
            task("c", &["a_out"], "c_out"),
        ];
        let executor = TaskExecutor::new("test", 4);
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        let err = schedule_graph(
            &executor,
            &tasks,
            "response",
            &[],
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
            async { Ok(()) },
        )
        .unwrap_err();

        assert!(matches!(err, SchedulingError::CycleDetected(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        executor.run().await.unwrap();
    }

    #[test]
    fn test_unknown_terminal_input_is_rejected() {
        let tasks = vec![task("a", &[], "a_out")];
        let err = check_graph(&tasks, "response", &names(&["missing"])).unwrap_err();
        assert_eq!(
            err,
            SchedulingError::UnknownIntermediateValue {
                consumer: "response".into(),
                value: "missing".into(),
            }
        );
    }

    #[test]
    fn test_unknown_task_input_is_rejected() {
        let tasks = vec![task("a", &["nope"], "a_out")];
        assert!(matches!(
            check_graph(&tasks, "response", &[]),
            Err(SchedulingError::UnknownIntermediateValue { .. })
        ));
    }

    #[test]
    fn test_duplicate_producer_is_rejected() {
        let tasks = vec![task("a", &[], "v"), task("b", &[], "v")];
        assert_eq!(
            check_graph(&tasks, "response", &[]).unwrap_err(),
            SchedulingError::DuplicateProducer {
                value: "v".into(),
                first: "a".into(),
                second: "b".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_shared_producer_runs_once() {
        let tasks = vec![
            task("producer", &[], "shared"),
            task("left", &["shared"], "left_out"),
            task("right", &["shared"], "right_out"),
        ];
        let executor = TaskExecutor::new("test", 4);
        let values = IntermediateValues::new();
        let producer_runs = Arc::new(AtomicUsize::new(0));

        let v = values.clone();
        let runs = producer_runs.clone();
        let terminal_values = values.clone();
        schedule_graph(
            &executor,
            &tasks,
            "response",
            &names(&["left_out", "right_out"]),
            move |t| {
                let values = v.clone();
                let runs = runs.clone();
                let name = t.name.clone();
                let inputs = t.input_intermediate_values.clone();
                let output = t.output_intermediate_values()[0].clone();
                async move {
                    if name == "producer" {
                        let n = runs.fetch_add(1, Ordering::SeqCst);
                        values.set(&output, format!("computed-{n}"))
                    } else {
                        let seen = values.visible(&inputs)?;
                        values.set(&output, seen["shared"].clone())
                    }
                }
            },
            async move {
                let seen = terminal_values.visible(&["left_out".into(), "right_out".into()])?;
                assert_eq!(seen["left_out"], seen["right_out"]);
                Ok(())
            },
        )
        .unwrap();

        executor.run().await.unwrap();
        assert_eq!(producer_runs.load(Ordering::SeqCst), 1);
        assert_eq!(values.get("left_out").as_deref(), Some("computed-0"));
        assert_eq!(values.get("right_out").as_deref(), Some("computed-0"));
    }
}
