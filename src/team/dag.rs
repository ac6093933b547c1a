//! Graph validation and node state for team execution.
//!
//! Nodes are stored in a name-indexed map with dependencies held as id
//! references, never as owning pointers.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::{TeamMember, TeamTask};
use crate::domain::UsageStats;
use crate::error::{Result, SwarmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Runtime state of one task in the graph.
#[derive(Debug, Clone)]
pub struct DagNode {
    pub task: TeamTask,
    pub member: TeamMember,
    pub depends: Vec<String>,
    pub status: NodeStatus,
    pub iteration: u32,
    pub output: Option<String>,
    pub error: Option<String>,
    pub exit_code: i32,
    pub usage: UsageStats,
    /// For skipped nodes, the dependency that made progress impossible.
    pub skip_cause: Option<String>,
}

impl DagNode {
    fn new(task: TeamTask, member: TeamMember) -> Self {
        let depends = task.depends.clone();
        Self {
            task,
            member,
            depends,
            status: NodeStatus::Pending,
            iteration: 0,
            output: None,
            error: None,
            exit_code: 0,
            usage: UsageStats::default(),
            skip_cause: None,
        }
    }
}

/// Validated dependency graph, ready for scheduling.
#[derive(Debug)]
pub struct Dag {
    nodes: HashMap<String, DagNode>,
    order: Vec<String>,
}

/// Validate the team input and materialize runtime nodes.
///
/// Fails on an unknown assignee, a duplicate task id, an unresolved
/// dependency, and any dependency cycle.
pub fn build_dag(members: &[TeamMember], tasks: &[TeamTask]) -> Result<Dag> {
    let mut members_by_role: HashMap<&str, &TeamMember> = HashMap::new();
    for member in members {
        if members_by_role.insert(&member.role, member).is_some() {
            return Err(SwarmError::Config(format!(
                "Duplicate member role: {}",
                member.role
            )));
        }
    }

    let mut ids: HashSet<&str> = HashSet::new();
    for task in tasks {
        if !ids.insert(&task.id) {
            return Err(SwarmError::DuplicateTask(task.id.clone()));
        }
    }

    for task in tasks {
        if !members_by_role.contains_key(task.assignee.as_str()) {
            return Err(SwarmError::UnknownMember {
                role: task.assignee.clone(),
                task_id: task.id.clone(),
            });
        }
        if let Some(review) = &task.review {
            if !members_by_role.contains_key(review.assignee.as_str()) {
                return Err(SwarmError::UnknownMember {
                    role: review.assignee.clone(),
                    task_id: task.id.clone(),
                });
            }
        }
        for dep in &task.depends {
            if !ids.contains(dep.as_str()) {
                return Err(SwarmError::UnknownDependency {
                    dep: dep.clone(),
                    task_id: task.id.clone(),
                });
            }
        }
    }

    let dependencies: HashMap<String, Vec<String>> = tasks
        .iter()
        .map(|t| (t.id.clone(), t.depends.clone()))
        .collect();
    if let Some(path) = detect_cycle(&dependencies) {
        return Err(SwarmError::DependencyCycle { path });
    }

    let mut nodes = HashMap::with_capacity(tasks.len());
    let mut order = Vec::with_capacity(tasks.len());
    for task in tasks {
        let member = (*members_by_role[task.assignee.as_str()]).clone();
        order.push(task.id.clone());
        nodes.insert(task.id.clone(), DagNode::new(task.clone(), member));
    }

    Ok(Dag { nodes, order })
}

/// DFS coloring over the dependency map; returns the offending path when a
/// cycle exists.
fn detect_cycle(dependencies: &HashMap<String, Vec<String>>) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut visiting = HashSet::new();
    let mut path = Vec::new();

    for node in dependencies.keys() {
        if dfs(node, dependencies, &mut visited, &mut visiting, &mut path) {
            return Some(path);
        }
    }
    None
}

fn dfs(
    node: &str,
    graph: &HashMap<String, Vec<String>>,
    visited: &mut HashSet<String>,
    visiting: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> bool {
    if visiting.contains(node) {
        path.push(node.to_string());
        return true;
    }
    if visited.contains(node) {
        return false;
    }

    visited.insert(node.to_string());
    visiting.insert(node.to_string());
    path.push(node.to_string());

    if let Some(deps) = graph.get(node) {
        for dep in deps {
            if dfs(dep, graph, visited, visiting, path) {
                return true;
            }
        }
    }

    visiting.remove(node);
    path.pop();
    false
}

impl Dag {
    pub fn get(&self, id: &str) -> Option<&DagNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut DagNode> {
        self.nodes.get_mut(id)
    }

    /// Node ids in input order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Promote pending nodes whose dependencies completed to ready, and skip
    /// those blocked by a failed or skipped dependency. Runs to fixpoint so
    /// skips propagate transitively.
    pub fn promote(&mut self) {
        loop {
            let mut transitions: Vec<(String, NodeStatus, Option<String>)> = Vec::new();
            for id in &self.order {
                let node = &self.nodes[id];
                if node.status != NodeStatus::Pending {
                    continue;
                }
                let mut blocker: Option<String> = None;
                let mut all_completed = true;
                for dep in &node.depends {
                    match self.nodes[dep].status {
                        NodeStatus::Completed => {}
                        NodeStatus::Failed | NodeStatus::Skipped => {
                            blocker = Some(dep.clone());
                            all_completed = false;
                            break;
                        }
                        _ => all_completed = false,
                    }
                }
                if let Some(cause) = blocker {
                    transitions.push((id.clone(), NodeStatus::Skipped, Some(cause)));
                } else if all_completed {
                    transitions.push((id.clone(), NodeStatus::Ready, None));
                }
            }

            if transitions.is_empty() {
                return;
            }
            for (id, status, cause) in transitions {
                let node = self.nodes.get_mut(&id).expect("node indexed");
                node.status = status;
                node.skip_cause = cause;
            }
        }
    }

    /// Claim the next ready node (input order), transitioning it to running.
    pub fn take_ready(&mut self) -> Option<String> {
        let id = self
            .order
            .iter()
            .find(|id| self.nodes[*id].status == NodeStatus::Ready)?
            .clone();
        self.nodes.get_mut(&id).expect("node indexed").status = NodeStatus::Running;
        Some(id)
    }

    /// Whether any node may still make progress.
    pub fn has_unfinished(&self) -> bool {
        self.nodes.values().any(|n| !n.status.is_terminal())
    }

    /// Mark every non-terminal node skipped (cancellation path).
    pub fn skip_unfinished(&mut self, cause: &str) {
        for node in self.nodes.values_mut() {
            if !node.status.is_terminal() {
                node.status = NodeStatus::Skipped;
                node.skip_cause = Some(cause.to_string());
            }
        }
    }

    /// Follow `skip_cause` references back to the originating failure.
    pub fn root_cause(&self, id: &str) -> Option<String> {
        let mut current = self.nodes.get(id)?.skip_cause.clone()?;
        let mut hops = 0;
        while let Some(node) = self.nodes.get(&current) {
            match (&node.status, &node.skip_cause) {
                (NodeStatus::Skipped, Some(next)) if hops < self.nodes.len() => {
                    current = next.clone();
                    hops += 1;
                }
                _ => break,
            }
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(role: &str) -> TeamMember {
        TeamMember {
            role: role.to_string(),
            ..Default::default()
        }
    }

    fn task(id: &str, assignee: &str, depends: &[&str]) -> TeamTask {
        TeamTask::new(id, format!("work on {}", id), assignee)
            .depends_on(depends.iter().copied())
    }

    #[test]
    fn builds_valid_graph() {
        let members = vec![member("dev")];
        let tasks = vec![
            task("a", "dev", &[]),
            task("b", "dev", &["a"]),
            task("c", "dev", &["a", "b"]),
        ];

        let dag = build_dag(&members, &tasks).unwrap();
        assert_eq!(dag.len(), 3);
        assert_eq!(dag.get("c").unwrap().depends, ["a", "b"]);
        assert_eq!(dag.get("a").unwrap().status, NodeStatus::Pending);
    }

    #[test]
    fn rejects_unknown_assignee() {
        let err = build_dag(&[member("dev")], &[task("a", "ghost", &[])]).unwrap_err();
        assert!(matches!(err, SwarmError::UnknownMember { .. }));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let tasks = vec![task("a", "dev", &[]), task("a", "dev", &[])];
        let err = build_dag(&[member("dev")], &tasks).unwrap_err();
        assert!(matches!(err, SwarmError::DuplicateTask(_)));
    }

    #[test]
    fn rejects_unknown_dependency() {
        let err = build_dag(&[member("dev")], &[task("a", "dev", &["missing"])]).unwrap_err();
        assert!(matches!(err, SwarmError::UnknownDependency { .. }));
    }

    #[test]
    fn rejects_cycles_with_path() {
        let tasks = vec![
            task("a", "dev", &["c"]),
            task("b", "dev", &["a"]),
            task("c", "dev", &["b"]),
        ];
        let err = build_dag(&[member("dev")], &tasks).unwrap_err();
        let SwarmError::DependencyCycle { path } = err else {
            panic!("expected cycle error");
        };
        assert!(path.len() >= 3);
    }

    #[test]
    fn rejects_self_dependency() {
        let err = build_dag(&[member("dev")], &[task("a", "dev", &["a"])]).unwrap_err();
        assert!(matches!(err, SwarmError::DependencyCycle { .. }));
    }

    #[test]
    fn promote_readies_roots_only() {
        let members = vec![member("dev")];
        let tasks = vec![task("a", "dev", &[]), task("b", "dev", &["a"])];
        let mut dag = build_dag(&members, &tasks).unwrap();

        dag.promote();
        assert_eq!(dag.get("a").unwrap().status, NodeStatus::Ready);
        assert_eq!(dag.get("b").unwrap().status, NodeStatus::Pending);
    }

    #[test]
    fn failure_skips_transitively() {
        let members = vec![member("dev")];
        let tasks = vec![
            task("a", "dev", &[]),
            task("b", "dev", &["a"]),
            task("c", "dev", &["b"]),
        ];
        let mut dag = build_dag(&members, &tasks).unwrap();

        dag.get_mut("a").unwrap().status = NodeStatus::Failed;
        dag.promote();

        assert_eq!(dag.get("b").unwrap().status, NodeStatus::Skipped);
        assert_eq!(dag.get("c").unwrap().status, NodeStatus::Skipped);
        assert_eq!(dag.root_cause("c").as_deref(), Some("a"));
    }

    #[test]
    fn take_ready_claims_in_input_order() {
        let members = vec![member("dev")];
        let tasks = vec![task("x", "dev", &[]), task("y", "dev", &[])];
        let mut dag = build_dag(&members, &tasks).unwrap();
        dag.promote();

        assert_eq!(dag.take_ready().as_deref(), Some("x"));
        assert_eq!(dag.take_ready().as_deref(), Some("y"));
        assert_eq!(dag.take_ready(), None);
        assert_eq!(dag.get("x").unwrap().status, NodeStatus::Running);
    }
}
