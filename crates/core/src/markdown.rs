use crate::model::{ComparisonReport, EntryNode};

pub fn render_markdown_summary(report: &ComparisonReport) -> String {
    let mut out = String::new();
    out.push_str("# Pathfinder Comparison\n\n");
    out.push_str(&format!(
        "- Report version: `{}`\n- Generated at: `{}`\n- Left: `{}`\n- Right: `{}`\n- Method: `{:?}`\n- Show all: `{}`\n- Scan elapsed: `{} ms`\n\n",
        report.report_version,
        report.generated_at,
        report.left_root,
        report.right_root,
        report.compare_method,
        report.include_unchanged,
        report.elapsed_ms
    ));

    out.push_str("## Summary\n\n");
    out.push_str(&format!(
        "| Changed | Not backed up | Only in backup | Unchanged | Unknown |\n|---|---|---|---|---|\n| {} | {} | {} | {} | {} |\n\n",
        report.counts.changed,
        report.counts.left_only,
        report.counts.right_only,
        report.counts.unchanged,
        report.counts.unknown
    ));

    out.push_str("## Entries\n\n");
    if !report.has_changes || report.entries.is_empty() {
        out.push_str("Hooray! No changes to show.\n\n");
    } else {
        render_nodes(&report.entries, 0, &mut out);
        out.push('\n');
    }

    if !report.warnings.is_empty() {
        out.push_str("## Warnings\n\n");
        for warning in &report.warnings {
            out.push_str(&format!("- {}\n", warning));
        }
    }

    out
}

fn render_nodes(nodes: &[EntryNode], depth: usize, out: &mut String) {
    for node in nodes {
        let entry = &node.entry;
        let indent = "  ".repeat(depth);
        let suffix = if entry.is_dir { "/" } else { "" };
        let label = entry.change.presentation().label;
        let mut line = format!("{indent}- `{}{}`", entry.name, suffix);
        if !label.is_empty() {
            line.push_str(&format!(" ({label})"));
        }
        if let Some(error) = &entry.error {
            line.push_str(&format!(" error: {error}"));
        }
        out.push_str(&line);
        out.push('\n');

        if let Some(children) = &node.children {
            render_nodes(children, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::render_markdown_summary;
    use crate::config::CompareConfig;
    use crate::model::{ChangeKind, Entry, EntryNode};
    use crate::report::build_report;

    fn node(name: &str, change: ChangeKind, children: Option<Vec<EntryNode>>) -> EntryNode {
        EntryNode {
            id: 0,
            entry: Entry {
                name: name.to_string(),
                path: PathBuf::from(name),
                alternate_path: None,
                relative_path: PathBuf::from(name),
                kind: String::new(),
                change,
                is_dir: children.is_some(),
                visible: true,
                error: None,
            },
            children,
        }
    }

    #[test]
    fn renders_nested_entries_with_labels() {
        let entries = vec![
            node("a.txt", ChangeKind::Changed, None),
            node(
                "photos",
                ChangeKind::Unknown,
                Some(vec![node("cat.png", ChangeKind::LeftOnly, None)]),
            ),
        ];
        let report = build_report(
            "scan",
            &CompareConfig::with_roots("/l", "/r"),
            true,
            5,
            entries,
            Vec::new(),
        );

        let markdown = render_markdown_summary(&report);
        assert!(markdown.contains("- `a.txt` (Changed)\n"));
        assert!(markdown.contains("- `photos/`\n"));
        assert!(markdown.contains("  - `cat.png` (Not backed up)\n"));
        assert!(markdown.contains("| 1 | 1 | 0 | 0 | 0 |"));
    }

    #[test]
    fn empty_result_says_so() {
        let report = build_report(
            "scan",
            &CompareConfig::with_roots("/l", "/r"),
            false,
            0,
            Vec::new(),
            Vec::new(),
        );
        assert!(render_markdown_summary(&report).contains("Hooray! No changes to show."));
    }
}
