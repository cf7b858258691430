// SPDX-License-Identifier: MIT

//! Graph workflow executor
//!
//! Scheduling uses an explicit worklist. Edges that close a cycle are found
//! with a depth-first walk from the entry nodes; every other edge is forward.
//! A node fires once every reachable forward predecessor has either delivered
//! an output or been skipped; it is skipped itself when nothing was delivered.
//! Back edges re-activate their target directly and count as a cycle. While a
//! looping condition stays in its loop, its exit edges remain unresolved.

use super::code::{run_code, CodeBindings};
use super::context::{reachable_from, RunContext};
use super::file::{read_source, write_sink};
use super::prompt::{run_prompt, PromptInvocation};
use super::ExecutionError;
use crate::adk::command::{Attachment, CommandExecutor};
use crate::flow::config::{EngineConfig, DEFAULT_CODE_TIMEOUT_MS, DEFAULT_MAX_STEPS};
use crate::flow::workflow::condition;
use crate::flow::workflow::{
    now_timestamp, ExecutionContext, Node, NodeData, NodeKind, RunStatus, StepResult, StepStatus,
    WorkflowDefinition, WorkflowRun, HANDLE_FALSE, HANDLE_TRUE,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A finished run and the context it accumulated
#[derive(Debug, Clone)]
pub struct Execution {
    pub run: WorkflowRun,
    pub context: ExecutionContext,
}

/// Which outgoing edges a node's output follows
#[derive(Debug, Clone, Copy, PartialEq)]
enum Route {
    All,
    Branch(bool),
}

struct NodeOutcome {
    output: Value,
    route: Route,
    /// Source files only feed attachments, not inputs
    data_only: bool,
    cycle_count: Option<u32>,
}

#[derive(Debug, Clone)]
struct Arrival {
    from: String,
    value: Value,
    data_only: bool,
}

#[derive(Debug, Default)]
struct Inbox {
    resolved: HashSet<String>,
    arrivals: Vec<Arrival>,
}

#[derive(Debug)]
enum Activation {
    Fire {
        node_id: String,
        input: Value,
        primary_from: Option<String>,
    },
    Skip(String),
}

/// Static facts about the graph, computed once per run
struct Plan<'a> {
    def: &'a WorkflowDefinition,
    back_edges: Vec<bool>,
    forward_preds: HashMap<&'a str, HashSet<&'a str>>,
    on_cycle: HashSet<&'a str>,
    /// Looping condition -> the branch that leaves its loop
    exits: HashMap<&'a str, bool>,
}

/// Marks the edges that close a cycle: an edge into a node that is still on
/// the depth-first stack. Walks from the entry nodes first, then from any
/// node left unvisited, following nodes and edges in definition order.
fn loop_edges(def: &WorkflowDefinition) -> Vec<bool> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Open,
        Done,
    }

    let index: HashMap<&str, usize> = def
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); def.nodes.len()];
    for (e, edge) in def.edges.iter().enumerate() {
        if let Some(&source) = index.get(edge.source.as_str()) {
            outgoing[source].push(e);
        }
    }

    let roots: Vec<usize> = def
        .entry_nodes()
        .into_iter()
        .filter_map(|n| index.get(n.id.as_str()).copied())
        .chain(0..def.nodes.len())
        .collect();
    let mut marks = vec![Mark::New; def.nodes.len()];
    let mut back = vec![false; def.edges.len()];

    for root in roots {
        if marks[root] != Mark::New {
            continue;
        }
        marks[root] = Mark::Open;
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        while let Some(&(node, next)) = stack.last() {
            let Some(&e) = outgoing[node].get(next) else {
                marks[node] = Mark::Done;
                stack.pop();
                continue;
            };
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            let Some(&target) = index.get(def.edges[e].target.as_str()) else {
                continue;
            };
            match marks[target] {
                Mark::Open => back[e] = true,
                Mark::New => {
                    marks[target] = Mark::Open;
                    stack.push((target, 0));
                }
                Mark::Done => {}
            }
        }
    }
    back
}

fn handle_for(branch: bool) -> &'static str {
    if branch {
        HANDLE_TRUE
    } else {
        HANDLE_FALSE
    }
}

impl<'a> Plan<'a> {
    fn new(def: &'a WorkflowDefinition) -> Self {
        let back_edges: Vec<bool> = loop_edges(def);

        let mut reachable: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = def.entry_nodes().into_iter().map(|n| n.id.as_str()).collect();
        while let Some(id) = queue.pop_front() {
            if reachable.insert(id) {
                queue.extend(def.outgoing(id).map(|e| e.target.as_str()));
            }
        }

        let mut forward_preds: HashMap<&str, HashSet<&str>> = HashMap::new();
        for (edge, back) in def.edges.iter().zip(&back_edges) {
            if !*back && reachable.contains(edge.source.as_str()) {
                forward_preds
                    .entry(edge.target.as_str())
                    .or_default()
                    .insert(edge.source.as_str());
            }
        }

        let mut on_cycle: HashSet<&str> = HashSet::new();
        let mut exits: HashMap<&str, bool> = HashMap::new();
        for node in def.nodes.iter().filter(|n| n.kind == NodeKind::Condition) {
            let id = node.id.as_str();
            if !reachable_from(def, id).contains(id) {
                continue;
            }
            on_cycle.insert(id);

            let loops_back = |branch: bool| {
                def.outgoing(id)
                    .filter(|e| e.source_handle.as_deref() == Some(handle_for(branch)))
                    .any(|e| e.target == id || reachable_from(def, &e.target).contains(id))
            };
            match (loops_back(true), loops_back(false)) {
                (true, false) => {
                    exits.insert(id, false);
                }
                (false, true) => {
                    exits.insert(id, true);
                }
                _ => {}
            }
        }

        Self {
            def,
            back_edges,
            forward_preds,
            on_cycle,
            exits,
        }
    }

    /// Branch forced once a looping condition exceeds its maxCycles
    fn exit_branch(&self, node_id: &str) -> bool {
        self.exits.get(node_id).copied().unwrap_or(false)
    }

    fn ready(&self, node_id: &str, inbox: &Inbox) -> bool {
        self.forward_preds
            .get(node_id)
            .map_or(true, |preds| preds.iter().all(|p| inbox.resolved.contains(*p)))
    }
}

/// Walks workflow graphs
pub struct Executor {
    commands: Arc<dyn CommandExecutor>,
    vault: PathBuf,
    code_timeout: Duration,
    max_steps: usize,
}

impl Executor {
    pub fn new(commands: Arc<dyn CommandExecutor>, vault: impl Into<PathBuf>) -> Self {
        Self {
            commands,
            vault: vault.into(),
            code_timeout: Duration::from_millis(DEFAULT_CODE_TIMEOUT_MS),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn from_config(commands: Arc<dyn CommandExecutor>, config: &EngineConfig) -> Self {
        Self::new(commands, config.vault.clone())
            .with_code_timeout(config.code_timeout)
            .with_max_steps(config.max_steps)
    }

    pub fn with_code_timeout(mut self, timeout: Duration) -> Self {
        self.code_timeout = timeout;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Execute `def` once
    pub async fn run(&self, def: &WorkflowDefinition, input: Option<Value>) -> Execution {
        let run_id = format!("run_{}", uuid::Uuid::new_v4().simple());
        let started_at = now_timestamp();
        log::info!("[{}] Running workflow {} ({} nodes)", run_id, def.id, def.nodes.len());

        let plan = Plan::new(def);
        let mut run_ctx = RunContext::new(def, run_id.clone(), input.clone());
        let mut steps: Vec<StepResult> = def.nodes.iter().map(|n| StepResult::pending(&n.id)).collect();
        let index: HashMap<&str, usize> = def
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let run_input = input.unwrap_or(Value::Null);
        let mut queue: VecDeque<Activation> = def
            .entry_nodes()
            .into_iter()
            .map(|n| Activation::Fire {
                node_id: n.id.clone(),
                input: run_input.clone(),
                primary_from: None,
            })
            .collect();
        let mut inboxes: HashMap<String, Inbox> = HashMap::new();
        let mut executed = 0usize;
        let mut failure: Option<ExecutionError> = None;

        while let Some(activation) = queue.pop_front() {
            let (node_id, input, primary_from) = match activation {
                Activation::Skip(node_id) => {
                    if let Some(&i) = index.get(node_id.as_str()) {
                        if steps[i].status == StepStatus::Pending {
                            log::debug!("[{}] Skipping {}", run_id, node_id);
                            steps[i].status = StepStatus::Skipped;
                            steps[i].finished_at = Some(now_timestamp());
                        }
                    }
                    self.propagate(&plan, &node_id, None, &run_input, &mut run_ctx, &mut inboxes, &mut queue);
                    continue;
                }
                Activation::Fire {
                    node_id,
                    input,
                    primary_from,
                } => (node_id, input, primary_from),
            };

            if executed >= self.max_steps {
                log::warn!("[{}] Step budget of {} exhausted", run_id, self.max_steps);
                failure = Some(ExecutionError::StepBudget(self.max_steps));
                break;
            }
            executed += 1;

            let (Some(node), Some(&i)) = (def.node(&node_id), index.get(node_id.as_str())) else {
                continue;
            };
            let iteration = run_ctx.visit(&node_id);
            steps[i] = StepResult {
                status: StepStatus::Running,
                input: Some(input.clone()),
                started_at: Some(now_timestamp()),
                ..StepResult::pending(&node_id)
            };
            log::info!("[{}] Executing {} node {} (visit {})", run_id, node.kind, node_id, iteration);

            let outcome = self
                .dispatch(&plan, node, input, primary_from.as_deref(), iteration, &mut run_ctx)
                .await;
            steps[i].finished_at = Some(now_timestamp());

            match outcome {
                Ok(outcome) => {
                    steps[i].status = StepStatus::Completed;
                    steps[i].output = Some(outcome.output.clone());
                    steps[i].cycle_count = outcome.cycle_count;
                    run_ctx.record_output(&node_id, outcome.output.clone());
                    self.propagate(
                        &plan,
                        &node_id,
                        Some(&outcome),
                        &run_input,
                        &mut run_ctx,
                        &mut inboxes,
                        &mut queue,
                    );
                }
                Err(e) => {
                    log::error!("[{}] {}", run_id, e);
                    steps[i].status = StepStatus::Failed;
                    steps[i].error = Some(e.to_string());
                    failure = Some(e);
                    break;
                }
            }
        }

        let finished_at = now_timestamp();
        for step in steps.iter_mut().filter(|s| s.status == StepStatus::Pending) {
            step.status = StepStatus::Skipped;
            step.finished_at = Some(finished_at.clone());
        }

        let status = if failure.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        log::info!(
            "[{}] Finished as {:?} after {} step(s), {} cycle(s)",
            run_id,
            status,
            executed,
            run_ctx.ctx.total_cycles
        );

        let context = run_ctx.into_context();
        Execution {
            run: WorkflowRun {
                id: run_id,
                workflow_id: def.id.clone(),
                status,
                steps,
                total_cycles: context.total_cycles,
                error: failure.map(|e| e.to_string()),
                started_at,
                finished_at: Some(finished_at),
            },
            context,
        }
    }

    async fn dispatch(
        &self,
        plan: &Plan<'_>,
        node: &Node,
        input: Value,
        primary_from: Option<&str>,
        iteration: u32,
        run_ctx: &mut RunContext,
    ) -> Result<NodeOutcome, ExecutionError> {
        let def = plan.def;
        match &node.data {
            NodeData::Prompt(data) => {
                let invocation = PromptInvocation {
                    node_id: &node.id,
                    data,
                    primary: (!input.is_null()).then_some(input),
                    context: run_ctx.upstream_context(def, &node.id, primary_from),
                    attachments: run_ctx.attachments_for(&node.id),
                };
                let output = run_prompt(self.commands.as_ref(), &run_ctx.ctx, invocation).await?;
                Ok(NodeOutcome {
                    output,
                    route: Route::All,
                    data_only: false,
                    cycle_count: None,
                })
            }
            NodeData::Code(data) => {
                let bindings = CodeBindings {
                    input,
                    attachments: json!(run_ctx.attachments_for(&node.id)),
                    context: run_ctx.code_context(),
                };
                let output = run_code(&node.id, &data.code, bindings, self.code_timeout).await?;
                Ok(NodeOutcome {
                    output,
                    route: Route::All,
                    data_only: false,
                    cycle_count: None,
                })
            }
            NodeData::Condition(data) => {
                let expression = condition::parse(&data.expression).map_err(|e| ExecutionError::Expression {
                    node_id: node.id.clone(),
                    message: e.to_string(),
                })?;

                let looping = plan.on_cycle.contains(node.id.as_str());
                let branch = if looping && iteration > data.max_cycles {
                    let exit = plan.exit_branch(&node.id);
                    log::info!(
                        "[{}] Visit {} exceeds maxCycles {}; leaving the loop by its {} branch",
                        node.id,
                        iteration,
                        data.max_cycles,
                        handle_for(exit)
                    );
                    exit
                } else {
                    let scope = run_ctx.condition_scope(&input, iteration, data.max_cycles, &node.id);
                    condition::evaluate(&expression, &scope)
                };
                log::debug!("[{}] Condition is {}", node.id, branch);

                Ok(NodeOutcome {
                    output: input,
                    route: Route::Branch(branch),
                    data_only: false,
                    cycle_count: looping.then_some(iteration),
                })
            }
            NodeData::File(data) => {
                let has_incoming = def.incoming(&node.id).next().is_some();
                if !has_incoming {
                    let attachment = read_source(&self.vault, &node.id, data).await?;
                    let output = Value::String(attachment.content.clone());
                    run_ctx.register_attachment(attachment);
                    return Ok(NodeOutcome {
                        output,
                        route: Route::All,
                        data_only: true,
                        cycle_count: None,
                    });
                }

                let text = write_sink(&self.vault, &node.id, data, &input).await?;
                if def.outgoing(&node.id).next().is_some() {
                    run_ctx.register_attachment(Attachment {
                        node_id: node.id.clone(),
                        path: data.path.clone(),
                        content: text.clone(),
                    });
                }
                Ok(NodeOutcome {
                    output: Value::String(text),
                    route: Route::All,
                    data_only: false,
                    cycle_count: None,
                })
            }
        }
    }

    /// Deliver a node's outcome (or its skip, when `outcome` is `None`)
    /// along its outgoing edges
    #[allow(clippy::too_many_arguments)]
    fn propagate(
        &self,
        plan: &Plan<'_>,
        source: &str,
        outcome: Option<&NodeOutcome>,
        run_input: &Value,
        run_ctx: &mut RunContext,
        inboxes: &mut HashMap<String, Inbox>,
        queue: &mut VecDeque<Activation>,
    ) {
        let mut touched: Vec<&str> = Vec::new();

        // The loop will revisit this condition; its exit resolves later
        let held = match (outcome.map(|o| o.route), plan.exits.get(source)) {
            (Some(Route::Branch(branch)), Some(&exit)) if branch != exit => Some(handle_for(exit)),
            _ => None,
        };

        for (edge, back) in plan.def.edges.iter().zip(&plan.back_edges) {
            if edge.source != source {
                continue;
            }
            if held.is_some() && edge.source_handle.as_deref() == held {
                continue;
            }
            let taken = outcome.filter(|o| match o.route {
                Route::All => true,
                Route::Branch(branch) => edge.source_handle.as_deref() == Some(handle_for(branch)),
            });

            if *back {
                if let Some(o) = taken {
                    run_ctx.record_cycle();
                    log::debug!("Back edge {} re-activates {}", edge.id, edge.target);
                    queue.push_back(Activation::Fire {
                        node_id: edge.target.clone(),
                        input: o.output.clone(),
                        primary_from: Some(source.to_string()),
                    });
                }
                continue;
            }

            let inbox = inboxes.entry(edge.target.clone()).or_default();
            inbox.resolved.insert(source.to_string());
            if let Some(o) = taken {
                inbox.arrivals.push(Arrival {
                    from: source.to_string(),
                    value: o.output.clone(),
                    data_only: o.data_only,
                });
            }
            if !touched.contains(&edge.target.as_str()) {
                touched.push(edge.target.as_str());
            }
        }

        for target in touched {
            let ready = inboxes.get(target).is_some_and(|inbox| plan.ready(target, inbox));
            if !ready {
                continue;
            }
            let Some(inbox) = inboxes.remove(target) else {
                continue;
            };
            if inbox.arrivals.is_empty() {
                queue.push_back(Activation::Skip(target.to_string()));
                continue;
            }

            let primary = inbox.arrivals.iter().rev().find(|a| !a.data_only);
            let (input, primary_from) = match primary {
                Some(arrival) => (arrival.value.clone(), Some(arrival.from.clone())),
                None => (run_input.clone(), None),
            };
            queue.push_back(Activation::Fire {
                node_id: target.to_string(),
                input,
                primary_from,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::command::{CommandRequest, CommandResponse};
    use crate::adk::error::ProviderError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies with "<task> <- <primary>" and records every request
    struct EchoCommands {
        seen: Mutex<Vec<CommandRequest>>,
    }

    impl EchoCommands {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(vec![]),
            })
        }
    }

    #[async_trait]
    impl CommandExecutor for EchoCommands {
        async fn execute(&self, request: CommandRequest) -> Result<CommandResponse, ProviderError> {
            let primary = request
                .input
                .primary
                .as_ref()
                .map(crate::adk::command::value_to_text)
                .unwrap_or_default();
            let content = format!("{} <- {}", request.task, primary);
            self.seen.lock().unwrap().push(request);
            Ok(CommandResponse { content })
        }
    }

    fn prompt(id: &str, text: &str) -> Value {
        json!({"id": id, "type": "prompt", "position": {"x": 0, "y": 0},
               "data": {"type": "prompt", "label": id, "prompt": text}})
    }

    fn edge(source: &str, target: &str) -> Value {
        json!({"id": format!("{}-{}", source, target), "source": source, "target": target})
    }

    fn branch(source: &str, target: &str, handle: &str) -> Value {
        json!({"id": format!("{}-{}", source, target), "source": source, "target": target,
               "sourceHandle": handle})
    }

    fn workflow(nodes: Vec<Value>, edges: Vec<Value>) -> WorkflowDefinition {
        serde_json::from_value(json!({
            "id": "wf", "name": "Test", "version": 1, "nodes": nodes, "edges": edges,
            "settings": {}, "created": "t", "updated": "t"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_linear_chain_passes_outputs() {
        let commands = EchoCommands::new();
        let executor = Executor::new(commands.clone(), "/tmp");
        let def = workflow(
            vec![prompt("a", "first"), prompt("b", "@editor second")],
            vec![edge("a", "b")],
        );

        let execution = executor.run(&def, Some(json!("start"))).await;

        assert_eq!(execution.run.status, RunStatus::Completed);
        assert_eq!(execution.run.step("a").unwrap().output, Some(json!("first <- start")));
        assert_eq!(
            execution.run.step("b").unwrap().output,
            Some(json!("second <- first <- start"))
        );
        let seen = commands.seen.lock().unwrap();
        assert_eq!(seen[1].agent_id.as_deref(), Some("editor"));
        assert_eq!(seen[1].workflow_id.as_deref(), Some("wf"));
        assert_eq!(execution.context.visit_counts["b"], 1);
    }

    #[tokio::test]
    async fn test_untaken_branch_is_skipped() {
        let executor = Executor::new(EchoCommands::new(), "/tmp");
        let def = workflow(
            vec![
                prompt("a", "go"),
                json!({"id": "c", "type": "condition", "position": {"x": 0, "y": 0},
                       "data": {"type": "condition", "label": "C",
                                "expression": "input contains 'go'", "maxCycles": 0}}),
                prompt("yes", "yes"),
                prompt("no", "no"),
                prompt("after_no", "after"),
            ],
            vec![
                edge("a", "c"),
                branch("c", "yes", "true"),
                branch("c", "no", "false"),
                edge("no", "after_no"),
            ],
        );

        let execution = executor.run(&def, None).await;

        assert_eq!(execution.run.status, RunStatus::Completed);
        assert_eq!(execution.run.step("yes").unwrap().status, StepStatus::Completed);
        assert_eq!(execution.run.step("no").unwrap().status, StepStatus::Skipped);
        assert_eq!(execution.run.step("after_no").unwrap().status, StepStatus::Skipped);
        // Routing does not change the payload
        assert_eq!(
            execution.run.step("c").unwrap().output,
            execution.run.step("a").unwrap().output
        );
    }

    #[tokio::test]
    async fn test_join_waits_for_all_branches() {
        let commands = EchoCommands::new();
        let executor = Executor::new(commands.clone(), "/tmp");
        let def = workflow(
            vec![prompt("a", "a"), prompt("b", "b"), prompt("mid", "mid"), prompt("join", "join")],
            vec![edge("a", "join"), edge("b", "mid"), edge("mid", "join")],
        );

        let execution = executor.run(&def, None).await;

        let join = execution.run.step("join").unwrap();
        assert_eq!(join.status, StepStatus::Completed);
        assert_eq!(join.output, Some(json!("join <- mid <- b <- ")));
        assert_eq!(execution.context.visit_counts["join"], 1);

        let seen = commands.seen.lock().unwrap();
        let join_request = seen.iter().find(|r| r.node_id.as_deref() == Some("join")).unwrap();
        let context_ids: Vec<&str> = join_request.input.context.iter().map(|c| c.node_id.as_str()).collect();
        assert_eq!(context_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_loop_edges_ignore_uneven_joins() {
        let dag = workflow(
            vec![prompt("a", "a"), prompt("b", "b"), prompt("c", "c"), prompt("join", "join")],
            vec![edge("a", "b"), edge("b", "c"), edge("c", "join"), edge("a", "join")],
        );
        assert_eq!(loop_edges(&dag), vec![false; 4]);

        let looped = workflow(
            vec![
                prompt("a", "a"),
                prompt("body", "body"),
                json!({"id": "gate", "type": "condition", "position": {"x": 0, "y": 0},
                       "data": {"type": "condition", "label": "G", "expression": "true", "maxCycles": 1}}),
                prompt("out", "out"),
            ],
            vec![
                edge("a", "body"),
                edge("body", "gate"),
                branch("gate", "body", "false"),
                branch("gate", "out", "true"),
            ],
        );
        assert_eq!(loop_edges(&looped), vec![false, false, true, false]);

        let plan = Plan::new(&looped);
        assert!(plan.on_cycle.contains("gate"));
        assert!(plan.exit_branch("gate"));
    }

    #[tokio::test]
    async fn test_step_budget_fails_the_run() {
        let executor = Executor::new(EchoCommands::new(), "/tmp").with_max_steps(1);
        let def = workflow(vec![prompt("a", "a"), prompt("b", "b")], vec![edge("a", "b")]);

        let execution = executor.run(&def, None).await;

        assert_eq!(execution.run.status, RunStatus::Failed);
        assert_eq!(execution.run.error.as_deref(), Some("Run stopped after 1 steps"));
        assert_eq!(execution.run.step("b").unwrap().status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn test_bad_expression_fails_the_step() {
        let executor = Executor::new(EchoCommands::new(), "/tmp");
        let def = workflow(
            vec![
                json!({"id": "c", "type": "condition", "position": {"x": 0, "y": 0},
                       "data": {"type": "condition", "label": "C", "expression": "(input ==", "maxCycles": 1}}),
                prompt("t", "t"),
                prompt("f", "f"),
            ],
            vec![branch("c", "t", "true"), branch("c", "f", "false")],
        );

        let execution = executor.run(&def, None).await;

        assert_eq!(execution.run.status, RunStatus::Failed);
        let step = execution.run.step("c").unwrap();
        assert_eq!(step.status, StepStatus::Failed);
        assert!(step.error.as_deref().unwrap().contains("expression error"));
        assert_eq!(execution.run.step("t").unwrap().status, StepStatus::Skipped);
    }
}
