//! Pruning of repeated identical tool calls.
//!
//! Runs outside the per-session run lock. It only ever truncates records
//! that have a later identical call, and truncation re-checks the
//! `truncated` flag on disk, so overlapping with a truncation pass is
//! harmless.

use crate::storage::{StorageLayout, ToolOutputStore};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Tool names whose repeated calls are meaningful and never pruned.
pub const BUILTIN_PROTECTED_TOOLS: &[&str] = &["task", "todowrite", "todoread", "lsp_rename"];

/// `<tool>::<canonical json input>` used to group identical calls.
pub fn tool_signature(tool: &str, input: &Value) -> String {
    format!("{tool}::{}", canonical(input))
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonical(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub turn: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeduplicationPlan {
    pub calls_to_prune: Vec<ToolCall>,
    pub duplicate_groups: usize,
    pub calls_scanned: usize,
    pub turns: u32,
}

impl DeduplicationPlan {
    pub fn call_ids(&self) -> HashSet<String> {
        self.calls_to_prune.iter().map(|c| c.call_id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.calls_to_prune.is_empty()
    }
}

pub struct DeduplicationPlanner {
    store: ToolOutputStore,
    protected: HashSet<String>,
}

impl DeduplicationPlanner {
    pub fn new(layout: StorageLayout, extra_protected: &[String]) -> Self {
        let protected = BUILTIN_PROTECTED_TOOLS
            .iter()
            .map(|t| t.to_string())
            .chain(extra_protected.iter().cloned())
            .collect();
        Self {
            store: ToolOutputStore::new(layout),
            protected,
        }
    }

    pub fn is_protected(&self, tool: &str) -> bool {
        self.protected.contains(tool)
    }

    /// Walk the session history in order and mark every call that has a
    /// later identical one.
    pub fn plan(&self, session_id: &str) -> DeduplicationPlan {
        let layout = self.store.layout();
        let mut plan = DeduplicationPlan::default();
        let mut group_index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<Vec<ToolCall>> = Vec::new();

        for message in layout.read_messages(session_id) {
            for part in layout.read_parts(&message.id) {
                match part.part_type() {
                    Some("step-start") => {
                        plan.turns += 1;
                        continue;
                    }
                    Some("tool") => {}
                    _ => continue,
                }

                let Some(call_id) = part.value.get("callID").and_then(Value::as_str) else {
                    continue;
                };
                let tool = part.value.get("tool").and_then(Value::as_str).unwrap_or("");
                if self.is_protected(tool) {
                    continue;
                }

                plan.calls_scanned += 1;
                let input = part
                    .value
                    .pointer("/state/input")
                    .cloned()
                    .unwrap_or(Value::Object(Map::new()));
                let signature = tool_signature(tool, &input);
                let idx = *group_index.entry(signature).or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
                groups[idx].push(ToolCall {
                    call_id: call_id.to_string(),
                    tool_name: tool.to_string(),
                    turn: plan.turns,
                });
            }
        }

        for mut group in groups.into_iter().filter(|g| g.len() > 1) {
            plan.duplicate_groups += 1;
            group.pop();
            plan.calls_to_prune.extend(group);
        }
        plan
    }

    /// Plan and prune; returns the number of outputs truncated.
    pub fn run(&self, session_id: &str) -> usize {
        let plan = self.plan(session_id);
        if plan.is_empty() {
            tracing::debug!(session_id, scanned = plan.calls_scanned, "no duplicate tool calls");
            return 0;
        }

        let pruned = self.store.truncate_by_call_ids(session_id, &plan.call_ids());
        tracing::info!(
            session_id,
            groups = plan.duplicate_groups,
            planned = plan.calls_to_prune.len(),
            pruned = pruned.len(),
            "pruned duplicate tool calls"
        );
        pruned.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    struct Session<'a> {
        root: &'a Path,
        next: usize,
    }

    impl<'a> Session<'a> {
        fn new(root: &'a Path) -> Self {
            Self { root, next: 0 }
        }

        fn message(&mut self, parts: Vec<Value>) {
            self.next += 1;
            let message_id = format!("msg_{:03}", self.next);
            let msg_dir = self.root.join("message/ses_1");
            fs::create_dir_all(&msg_dir).unwrap();
            fs::write(
                msg_dir.join(format!("{message_id}.json")),
                json!({
                    "id": message_id,
                    "sessionID": "ses_1",
                    "role": "assistant",
                    "time": {"created": self.next}
                })
                .to_string(),
            )
            .unwrap();

            let part_dir = self.root.join("part").join(&message_id);
            fs::create_dir_all(&part_dir).unwrap();
            for (i, mut part) in parts.into_iter().enumerate() {
                part["messageID"] = json!(message_id);
                fs::write(part_dir.join(format!("prt_{i:03}.json")), part.to_string()).unwrap();
            }
        }
    }

    fn tool(call_id: &str, tool: &str, input: Value) -> Value {
        json!({
            "id": format!("prt_{call_id}"),
            "type": "tool",
            "callID": call_id,
            "tool": tool,
            "state": {"status": "completed", "input": input, "output": format!("output of {call_id}")}
        })
    }

    fn step() -> Value {
        json!({"type": "step-start"})
    }

    #[test]
    fn test_signature_ignores_key_order() {
        let a = tool_signature("read", &json!({"path": "a.rs", "opts": {"x": 1, "y": 2}}));
        let b = tool_signature("read", &json!({"opts": {"y": 2, "x": 1}, "path": "a.rs"}));
        assert_eq!(a, b);
        assert!(a.starts_with("read::"));
        assert_ne!(a, tool_signature("glob", &json!({"path": "a.rs", "opts": {"x": 1, "y": 2}})));
    }

    #[test]
    fn test_plan_keeps_last_occurrence() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(dir.path());
        session.message(vec![step(), tool("c1", "read", json!({"path": "a.rs"}))]);
        session.message(vec![step(), tool("c2", "read", json!({"path": "b.rs"}))]);
        session.message(vec![step(), tool("c3", "read", json!({"path": "a.rs"}))]);
        session.message(vec![step(), tool("c4", "read", json!({"path": "a.rs"}))]);

        let planner = DeduplicationPlanner::new(StorageLayout::new(dir.path()), &[]);
        let plan = planner.plan("ses_1");

        let ids: Vec<&str> = plan.calls_to_prune.iter().map(|c| c.call_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c3"]);
        assert_eq!(plan.duplicate_groups, 1);
        assert_eq!(plan.calls_scanned, 4);
        assert_eq!(plan.turns, 4);
        assert_eq!(plan.calls_to_prune[1].turn, 3);
    }

    #[test]
    fn test_protected_tools_are_never_pruned() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(dir.path());
        session.message(vec![tool("t1", "todowrite", json!({"todos": []}))]);
        session.message(vec![tool("t2", "todowrite", json!({"todos": []}))]);
        session.message(vec![tool("m1", "memory", json!({"q": 1}))]);
        session.message(vec![tool("m2", "memory", json!({"q": 1}))]);

        let planner =
            DeduplicationPlanner::new(StorageLayout::new(dir.path()), &["memory".to_string()]);
        let plan = planner.plan("ses_1");

        assert!(plan.is_empty());
        assert_eq!(plan.calls_scanned, 0);
    }

    #[test]
    fn test_run_truncates_planned_calls() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(dir.path());
        session.message(vec![tool("c1", "bash", json!({"command": "ls"}))]);
        session.message(vec![tool("c2", "bash", json!({"command": "ls"}))]);

        let layout = StorageLayout::new(dir.path());
        let planner = DeduplicationPlanner::new(layout.clone(), &[]);
        assert_eq!(planner.run("ses_1"), 1);

        let remaining: Vec<String> = ToolOutputStore::new(layout)
            .find_tool_results_by_size("ses_1")
            .into_iter()
            .map(|r| r.call_id)
            .collect();
        assert_eq!(remaining, vec!["c2"]);

        assert_eq!(planner.run("ses_1"), 0);
    }

    #[test]
    fn test_parts_without_call_id_are_ignored() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(dir.path());
        let mut orphan = tool("x", "read", json!({"path": "a.rs"}));
        orphan.as_object_mut().unwrap().remove("callID");
        session.message(vec![orphan.clone()]);
        session.message(vec![orphan]);

        let planner = DeduplicationPlanner::new(StorageLayout::new(dir.path()), &[]);
        assert!(planner.plan("ses_1").is_empty());
    }
}
