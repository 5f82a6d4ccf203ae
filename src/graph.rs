use crate::models::{Issue, Status};
use std::collections::{HashMap, HashSet, VecDeque};

/// `blocks` adjacency: issue id -> ids it waits on.
pub type BlocksGraph = HashMap<String, Vec<String>>;

pub fn build_graph(issues: &[Issue]) -> BlocksGraph {
    issues
        .iter()
        .map(|issue| (issue.id.clone(), issue.blocks.clone()))
        .collect()
}

/// True when adding `from -> to` would close a cycle, i.e. `to` already reaches `from`.
pub fn would_create_cycle(graph: &BlocksGraph, from: &str, to: &str) -> bool {
    let mut queue = VecDeque::from([to]);
    let mut visited: HashSet<&str> = HashSet::new();
    while let Some(current) = queue.pop_front() {
        if current == from {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(next) = graph.get(current) {
            queue.extend(next.iter().map(String::as_str));
        }
    }
    false
}

/// A blocker missing from `statuses` does not block; archived or deleted blockers are absent.
pub fn is_blocked(issue: &Issue, statuses: &HashMap<&str, Status>) -> bool {
    issue
        .blocks
        .iter()
        .any(|blocker| statuses.get(blocker.as_str()).is_some_and(|status| !status.is_closed()))
}

pub fn status_index(issues: &[Issue]) -> HashMap<&str, Status> {
    issues
        .iter()
        .map(|issue| (issue.id.as_str(), issue.status))
        .collect()
}

/// Open issues with no open or active blocker among `issues`.
pub fn compute_ready(issues: &[Issue]) -> Vec<&Issue> {
    let statuses = status_index(issues);
    issues
        .iter()
        .filter(|issue| issue.status == Status::Open && !is_blocked(issue, &statuses))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(id: &str, status: Status, blocks: &[&str]) -> Issue {
        let mut issue = Issue::new(id, id, "2026-01-01");
        issue.status = status;
        issue.blocks = blocks.iter().map(|value| value.to_string()).collect();
        issue
    }

    fn ready_ids(issues: &[Issue]) -> Vec<String> {
        compute_ready(issues).into_iter().map(|issue| issue.id.clone()).collect()
    }

    #[test]
    fn chain_leaves_only_the_tail_ready() {
        let issues = vec![
            issue("a", Status::Open, &["b"]),
            issue("b", Status::Open, &["c"]),
            issue("c", Status::Open, &[]),
        ];
        assert_eq!(ready_ids(&issues), vec!["c".to_string()]);
    }

    #[test]
    fn active_blocks_and_closed_or_missing_do_not() {
        let issues = vec![
            issue("a", Status::Open, &["b"]),
            issue("b", Status::Active, &[]),
            issue("c", Status::Open, &["d", "archived-elsewhere"]),
            issue("d", Status::Closed, &[]),
        ];
        assert_eq!(ready_ids(&issues), vec!["c".to_string()]);
    }

    #[test]
    fn readiness_matches_definition_for_every_small_graph() {
        let ids = ["a", "b", "c"];
        let statuses = [Status::Open, Status::Active, Status::Closed];
        let pairs: Vec<(usize, usize)> = (0..3)
            .flat_map(|from| (0..3).filter(move |to| *to != from).map(move |to| (from, to)))
            .collect();

        for status_code in 0..27usize {
            let assigned: Vec<Status> = (0..3).map(|slot| statuses[(status_code / 3usize.pow(slot)) % 3]).collect();
            for edge_mask in 0..(1u32 << pairs.len()) {
                let issues: Vec<Issue> = (0..3)
                    .map(|node| {
                        let blocks: Vec<&str> = pairs
                            .iter()
                            .enumerate()
                            .filter(|(bit, (from, _))| edge_mask & (1 << bit) != 0 && *from == node)
                            .map(|(_, (_, to))| ids[*to])
                            .collect();
                        issue(ids[node], assigned[node], &blocks)
                    })
                    .collect();

                let expected: Vec<String> = (0..3)
                    .filter(|node| assigned[*node] == Status::Open)
                    .filter(|node| {
                        pairs.iter().enumerate().all(|(bit, (from, to))| {
                            edge_mask & (1 << bit) == 0 || *from != *node || assigned[*to] == Status::Closed
                        })
                    })
                    .map(|node| ids[node].to_string())
                    .collect();
                assert_eq!(ready_ids(&issues), expected, "statuses {:?} edges {:b}", assigned, edge_mask);
            }
        }
    }

    #[test]
    fn cycle_detection_follows_existing_edges() {
        let graph = build_graph(&[
            issue("a", Status::Open, &["b"]),
            issue("b", Status::Open, &["c"]),
            issue("c", Status::Open, &[]),
            issue("d", Status::Open, &[]),
        ]);
        assert!(would_create_cycle(&graph, "c", "a"));
        assert!(would_create_cycle(&graph, "b", "a"));
        assert!(would_create_cycle(&graph, "a", "a"));
        assert!(!would_create_cycle(&graph, "a", "c"));
        assert!(!would_create_cycle(&graph, "d", "a"));
        assert!(!would_create_cycle(&graph, "c", "d"));
    }

    #[test]
    fn cycle_detection_terminates_on_existing_cycles() {
        let graph = build_graph(&[
            issue("a", Status::Open, &["b"]),
            issue("b", Status::Open, &["a"]),
        ]);
        assert!(!would_create_cycle(&graph, "z", "a"));
    }
}
