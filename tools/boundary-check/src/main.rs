use cargo_metadata::{DependencyKind, MetadataCommand, Package};
use std::collections::{BTreeMap, BTreeSet};

/// Workspace crates from the bottom up. A crate may depend only on crates
/// listed before it.
const LAYERS: [&str; 6] = [
    "evalkit-core",
    "evalkit-frame",
    "evalkit-eval",
    "evalkit-report",
    "evalkit-runner",
    "evalkit-cli",
];

const SELF_NAME: &str = "boundary-check";

fn main() {
    let metadata = match MetadataCommand::new().exec() {
        Ok(metadata) => metadata,
        Err(err) => {
            eprintln!("boundary-check: failed to read cargo metadata: {err}");
            std::process::exit(2);
        }
    };

    let workspace: BTreeSet<_> = metadata.workspace_members.iter().cloned().collect();
    let packages: BTreeMap<String, Package> = metadata
        .packages
        .into_iter()
        .filter(|pkg| workspace.contains(&pkg.id))
        .map(|pkg| (pkg.name.clone(), pkg))
        .collect();

    let edges: Vec<Edge> = packages
        .values()
        .flat_map(|pkg| workspace_edges(pkg, &packages))
        .collect();
    let crates: Vec<&str> = packages.keys().map(String::as_str).collect();
    let violations = check(&crates, &edges);

    if violations.is_empty() {
        println!("boundary-check: ok ({} crates)", crates.len());
    } else {
        eprintln!("boundary-check: forbidden workspace dependencies detected:");
        for item in violations {
            eprintln!("  {item}");
        }
        std::process::exit(1);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edge {
    from: String,
    to: String,
    dev: bool,
}

fn workspace_edges(pkg: &Package, workspace: &BTreeMap<String, Package>) -> Vec<Edge> {
    pkg.dependencies
        .iter()
        .filter(|dep| workspace.contains_key(&dep.name) && dep.name != pkg.name)
        .map(|dep| Edge {
            from: pkg.name.clone(),
            to: dep.name.clone(),
            dev: dep.kind == DependencyKind::Development,
        })
        .collect()
}

fn layer(name: &str) -> Option<usize> {
    LAYERS.iter().position(|l| *l == name)
}

fn check(crates: &[&str], edges: &[Edge]) -> Vec<String> {
    let mut violations = Vec::new();
    for name in crates {
        if *name != SELF_NAME && layer(name).is_none() {
            violations.push(format!("{name} is not assigned a layer"));
        }
    }
    for edge in edges {
        if edge.from == SELF_NAME {
            continue;
        }
        let (Some(from), Some(to)) = (layer(&edge.from), layer(&edge.to)) else {
            continue;
        };
        if to >= from {
            let kind = if edge.dev { " (dev)" } else { "" };
            violations.push(format!("{} -> {}{kind}", edge.from, edge.to));
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(from: &str, to: &str, dev: bool) -> Edge {
        Edge {
            from: from.to_string(),
            to: to.to_string(),
            dev,
        }
    }

    #[test]
    fn downward_edges_pass() {
        let edges = [
            edge("evalkit-eval", "evalkit-frame", false),
            edge("evalkit-report", "evalkit-frame", true),
            edge("evalkit-cli", "evalkit-core", false),
        ];
        assert!(check(&LAYERS, &edges).is_empty());
    }

    #[test]
    fn upward_and_unassigned_crates_fail() {
        let edges = [edge("evalkit-frame", "evalkit-eval", true)];
        let violations = check(&["evalkit-frame", "evalkit-extra"], &edges);
        assert_eq!(
            violations,
            vec![
                "evalkit-extra is not assigned a layer".to_string(),
                "evalkit-frame -> evalkit-eval (dev)".to_string(),
            ]
        );
    }
}
