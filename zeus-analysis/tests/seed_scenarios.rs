//! End-to-end engine scenarios over hand-built projections

use zeus_analysis::{
    BottleneckAnalyzer, BottleneckType, GraphBuilder, GraphFilter, Severity, TimelineBuilder,
    UnifiedGraphBuilder,
};
use zeus_projections::timestamp::parse_flexible;
use zeus_projections::{ActivityInfo, EntityStatus, ObjectiveInfo, TaskInfo, UseCaseInfo};
use zeus_store::CancelToken;

fn task(id: &str, deps: &[&str]) -> TaskInfo {
    TaskInfo {
        id: id.to_string(),
        title: format!("Task {}", id),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        ..Default::default()
    }
}

#[test]
fn dependency_cycle_is_detected_with_its_node_set() {
    let tasks = vec![
        task("task-a", &["task-b"]),
        task("task-b", &["task-c"]),
        task("task-c", &["task-a"]),
    ];

    let graph = GraphBuilder::new(&tasks).build(&CancelToken::new()).unwrap();

    assert!(!graph.cycles.is_empty());
    let mut nodes: Vec<&str> = graph.cycles[0].iter().map(String::as_str).collect();
    nodes.sort();
    nodes.dedup();
    assert_eq!(nodes, vec!["task-a", "task-b", "task-c"]);
}

#[test]
fn cpm_linear_chain_has_zero_slack_throughout() {
    let chain = vec![
        TaskInfo {
            id: "task-001".to_string(),
            title: "T1".to_string(),
            start_date: parse_flexible("2025-01-01"),
            due_date: parse_flexible("2025-01-10"),
            ..Default::default()
        },
        TaskInfo {
            id: "task-002".to_string(),
            title: "T2".to_string(),
            start_date: parse_flexible("2025-01-10"),
            due_date: parse_flexible("2025-01-20"),
            dependencies: vec!["task-001".to_string()],
            ..Default::default()
        },
        TaskInfo {
            id: "task-003".to_string(),
            title: "T3".to_string(),
            start_date: parse_flexible("2025-01-20"),
            due_date: parse_flexible("2025-01-30"),
            dependencies: vec!["task-002".to_string()],
            ..Default::default()
        },
    ];

    let timeline = TimelineBuilder::new(&chain)
        .with_now(parse_flexible("2025-01-05T00:00:00Z").unwrap())
        .build(&CancelToken::new())
        .unwrap();

    assert_eq!(
        timeline.critical_path,
        vec!["task-001", "task-002", "task-003"]
    );
    assert_eq!(timeline.total_duration_days, 29);
    assert!(timeline.tasks.iter().all(|t| t.slack == 0));

    // Project duration equals the maximum early finish.
    let max_ef = timeline.tasks.iter().map(|t| t.early_finish).max().unwrap();
    assert_eq!(max_ef, timeline.total_duration_days);
}

#[test]
fn blocked_chain_is_one_critical_bottleneck() {
    let mut a = task("task-a", &[]);
    a.status = EntityStatus::Blocked;
    let mut b = task("task-b", &["task-a"]);
    b.status = EntityStatus::Blocked;
    let mut c = task("task-c", &["task-b"]);
    c.status = EntityStatus::Blocked;

    let report = BottleneckAnalyzer::new(&[a, b, c], &[], &[], &[])
        .analyze(&CancelToken::new())
        .unwrap();

    let chains: Vec<_> = report
        .items
        .iter()
        .filter(|i| i.kind == BottleneckType::BlockChain)
        .collect();
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].severity, Severity::Critical);
    assert_eq!(chains[0].entities, vec!["task-a", "task-b", "task-c"]);
}

#[test]
fn overdue_severity_follows_the_table() {
    let now = parse_flexible("2025-05-01T00:00:00Z").unwrap();
    let mk = |id: &str, due: &str| TaskInfo {
        id: id.to_string(),
        title: id.to_string(),
        status: EntityStatus::InProgress,
        due_date: parse_flexible(due),
        dependencies: vec!["task-root".to_string()],
        ..Default::default()
    };

    let tasks = vec![
        task("task-root", &[]),
        mk("task-ten", "2025-04-21"),
        mk("task-three", "2025-04-28"),
        mk("task-one", "2025-04-30"),
    ];

    let report = BottleneckAnalyzer::new(&tasks, &[], &[], &[])
        .with_now(now)
        .analyze(&CancelToken::new())
        .unwrap();

    let severity_of = |id: &str| {
        report
            .items
            .iter()
            .find(|i| i.kind == BottleneckType::Overdue && i.entities == vec![id.to_string()])
            .map(|i| i.severity)
            .unwrap()
    };
    assert_eq!(severity_of("task-ten"), Severity::Critical);
    assert_eq!(severity_of("task-three"), Severity::High);
    assert_eq!(severity_of("task-one"), Severity::Medium);
}

#[test]
fn group_filter_keeps_exactly_the_named_group() {
    let activities = vec![
        ActivityInfo {
            id: "act-001".to_string(),
            title: "A1".to_string(),
            usecase_id: Some("uc-001".to_string()),
            ..Default::default()
        },
        ActivityInfo {
            id: "act-002".to_string(),
            title: "A2".to_string(),
            usecase_id: Some("uc-002".to_string()),
            ..Default::default()
        },
    ];
    let usecases = vec![
        UseCaseInfo {
            id: "uc-001".to_string(),
            title: "U1".to_string(),
            objective_id: Some("obj-001".to_string()),
            ..Default::default()
        },
        UseCaseInfo {
            id: "uc-002".to_string(),
            title: "U2".to_string(),
            objective_id: Some("obj-002".to_string()),
            ..Default::default()
        },
    ];
    let objectives = vec![
        ObjectiveInfo {
            id: "obj-001".to_string(),
            title: "O1".to_string(),
            ..Default::default()
        },
        ObjectiveInfo {
            id: "obj-002".to_string(),
            title: "O2".to_string(),
            ..Default::default()
        },
    ];

    let graph = UnifiedGraphBuilder::new()
        .with_activities(&activities)
        .with_usecases(&usecases)
        .with_objectives(&objectives)
        .with_filter(GraphFilter {
            group_ids: vec!["obj-001".to_string()],
            ..Default::default()
        })
        .build(&CancelToken::new())
        .unwrap();

    let mut remaining: Vec<&String> = graph.nodes.keys().collect();
    remaining.sort();
    assert_eq!(remaining, vec!["act-001", "uc-001"]);
    assert!(graph
        .edges
        .iter()
        .all(|e| e.from != "act-002" && e.to != "uc-002"));
}

#[test]
fn engines_are_pure_across_invocations() {
    let tasks = vec![
        task("task-a", &[]),
        task("task-b", &["task-a"]),
        task("task-c", &["task-a", "task-b"]),
    ];

    let builder = GraphBuilder::new(&tasks);
    let first = builder.build(&CancelToken::new()).unwrap();
    let second = builder.build(&CancelToken::new()).unwrap();

    assert_eq!(first.to_dot(), second.to_dot());
    assert_eq!(first.to_mermaid(), second.to_mermaid());
    assert_eq!(first.to_text(), second.to_text());
    assert_eq!(first.isolated, second.isolated);
    assert_eq!(first.edges, second.edges);
}

#[test]
fn acyclic_build_admits_a_topological_order() {
    let tasks = vec![
        task("task-a", &[]),
        task("task-b", &["task-a"]),
        task("task-c", &["task-b"]),
        task("task-d", &["task-a", "task-c"]),
    ];
    let graph = GraphBuilder::new(&tasks).build(&CancelToken::new()).unwrap();
    assert!(graph.cycles.is_empty());

    // Kahn's check over the emitted edges: all nodes drain.
    let mut in_degree: std::collections::HashMap<&str, usize> = graph
        .nodes
        .keys()
        .map(|id| (id.as_str(), 0))
        .collect();
    for edge in &graph.edges {
        if let Some(slot) = in_degree.get_mut(edge.to.as_str()) {
            *slot += 1;
        }
    }
    let mut queue: Vec<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut drained = 0;
    while let Some(id) = queue.pop() {
        drained += 1;
        for edge in graph.edges.iter().filter(|e| e.from == id) {
            if let Some(slot) = in_degree.get_mut(edge.to.as_str()) {
                *slot -= 1;
                if *slot == 0 {
                    queue.push(edge.to.as_str());
                }
            }
        }
    }
    assert_eq!(drained, graph.nodes.len());
}
