use loomcore::{Edge, NodeSpec, NodeType, WorkflowError};
use loomruntime::build_execution_plan;

fn node(id: &str) -> NodeSpec {
    NodeSpec::new(id, NodeType::Text)
}

fn edge(source: &str, target: &str) -> Edge {
    Edge {
        id: format!("{}->{}", source, target),
        source: source.to_string(),
        source_handle: "output".to_string(),
        target: target.to_string(),
        target_handle: "user_message".to_string(),
    }
}

fn levels(plan: &loomruntime::ExecutionPlan) -> Vec<Vec<&str>> {
    plan.levels
        .iter()
        .map(|level| level.iter().map(String::as_str).collect())
        .collect()
}

#[test]
fn test_text_into_llm_has_two_levels() {
    let nodes = vec![node("text"), NodeSpec::new("llm", NodeType::Llm)];
    let plan = build_execution_plan(&nodes, &[edge("text", "llm")]).unwrap();

    assert_eq!(levels(&plan), vec![vec!["text"], vec!["llm"]]);
}

#[test]
fn test_independent_sources_share_level_zero() {
    let nodes = vec![node("src1"), node("src2"), node("src3"), NodeSpec::new("llm", NodeType::Llm)];
    let edges = vec![edge("src1", "llm"), edge("src2", "llm"), edge("src3", "llm")];

    let plan = build_execution_plan(&nodes, &edges).unwrap();

    assert_eq!(levels(&plan), vec![vec!["src1", "src2", "src3"], vec!["llm"]]);
}

#[test]
fn test_node_waits_for_its_deepest_predecessor() {
    let nodes = vec![node("a"), node("b"), node("c"), node("d")];
    let edges = vec![edge("a", "b"), edge("b", "c"), edge("a", "c"), edge("c", "d")];

    let plan = build_execution_plan(&nodes, &edges).unwrap();

    assert_eq!(levels(&plan), vec![vec!["a"], vec!["b"], vec!["c"], vec!["d"]]);
}

#[test]
fn test_diamond() {
    let nodes = vec![node("d"), node("c"), node("b"), node("a")];
    let edges = vec![edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")];

    let plan = build_execution_plan(&nodes, &edges).unwrap();

    // Nodes inside a level keep the order they were given in.
    assert_eq!(levels(&plan), vec![vec!["a"], vec!["c", "b"], vec!["d"]]);
}

#[test]
fn test_parallel_edges_between_same_nodes() {
    let nodes = vec![node("text"), NodeSpec::new("llm", NodeType::Llm)];
    let edges = vec![edge("text", "llm"), edge("text", "llm")];

    let plan = build_execution_plan(&nodes, &edges).unwrap();

    assert_eq!(levels(&plan), vec![vec!["text"], vec!["llm"]]);
}

#[test]
fn test_cycle_is_rejected() {
    let nodes = vec![node("a"), node("b"), node("c")];
    let edges = vec![edge("c", "a"), edge("a", "b"), edge("b", "a")];

    assert_eq!(build_execution_plan(&nodes, &edges), Err(WorkflowError::CycleDetected));
}

#[test]
fn test_self_loop_is_a_cycle() {
    let nodes = vec![node("a"), node("b")];
    let edges = vec![edge("a", "b"), edge("b", "b")];

    assert_eq!(build_execution_plan(&nodes, &edges), Err(WorkflowError::CycleDetected));
}

#[test]
fn test_dangling_edges_are_ignored() {
    let nodes = vec![node("a"), node("b")];
    let edges = vec![edge("ghost", "b"), edge("a", "nowhere")];

    let plan = build_execution_plan(&nodes, &edges).unwrap();

    assert_eq!(levels(&plan), vec![vec!["a", "b"]]);
}

#[test]
fn test_empty_graph() {
    let plan = build_execution_plan(&[], &[]).unwrap();

    assert!(plan.is_empty());
    assert_eq!(plan.node_count(), 0);
}

#[test]
fn test_generated_dags_respect_edge_order() {
    // Small linear congruential generator so the graphs are reproducible.
    let mut seed: u64 = 0x2545_f491;
    let mut next = move || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (seed >> 33) as usize
    };

    for round in 0..25 {
        let count = 2 + round % 12;
        let nodes: Vec<NodeSpec> = (0..count).map(|i| node(&format!("n{}", i))).collect();

        // Edges only go from lower to higher index, so the graph is acyclic.
        let mut edges = Vec::new();
        for _ in 0..count * 2 {
            let a = next() % count;
            let b = next() % count;
            if a < b {
                edges.push(edge(&format!("n{}", a), &format!("n{}", b)));
            }
        }

        let plan = build_execution_plan(&nodes, &edges).unwrap();
        let again = build_execution_plan(&nodes, &edges).unwrap();
        assert_eq!(plan, again, "plans should be deterministic");

        assert_eq!(plan.node_count(), count);
        for n in &nodes {
            let appearances = plan.levels.iter().flatten().filter(|id| **id == n.id).count();
            assert_eq!(appearances, 1, "{} should appear exactly once", n.id);
        }

        for e in &edges {
            let from = plan.level_of(&e.source).unwrap();
            let to = plan.level_of(&e.target).unwrap();
            assert!(from < to, "edge {} breaks level order ({} >= {})", e.id, from, to);
        }

        for n in &nodes {
            if !edges.iter().any(|e| e.target == n.id) {
                assert_eq!(plan.level_of(&n.id), Some(0));
            }
        }
    }
}
