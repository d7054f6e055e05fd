use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};

use crate::config::CompareConfig;
use crate::model::{ChangeCounts, ChangeKind, ComparisonReport, EntryNode, REPORT_VERSION};

pub fn build_report(
    scan_id: &str,
    config: &CompareConfig,
    has_changes: bool,
    elapsed_ms: u64,
    entries: Vec<EntryNode>,
    warnings: Vec<String>,
) -> ComparisonReport {
    let mut counts = ChangeCounts::default();
    tally(&entries, &mut counts);

    ComparisonReport {
        report_version: REPORT_VERSION.to_string(),
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        scan_id: scan_id.to_string(),
        left_root: root_label(config.left_root.as_deref()),
        right_root: root_label(config.right_root.as_deref()),
        include_unchanged: config.include_unchanged,
        compare_method: config.compare_method,
        ignore: config.ignore.clone(),
        has_changes,
        counts,
        elapsed_ms,
        entries,
        warnings,
    }
}

fn root_label(root: Option<&Path>) -> String {
    root.map(|path| path.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn tally(nodes: &[EntryNode], counts: &mut ChangeCounts) {
    for node in nodes {
        let entry = &node.entry;
        if !(entry.change == ChangeKind::Unknown && entry.is_dir && entry.error.is_none()) {
            counts.record(entry.change);
        }
        if let Some(children) = &node.children {
            tally(children, counts);
        }
    }
}

pub fn write_report(report: &ComparisonReport, output_path: impl AsRef<Path>) -> Result<()> {
    let path = output_path.as_ref();
    let payload = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    fs::write(path, payload)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    Ok(())
}

pub fn load_report(path: impl AsRef<Path>) -> Result<ComparisonReport> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read report {}", path.display()))?;
    let report = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::{build_report, load_report, write_report};
    use crate::config::CompareConfig;
    use crate::model::{ChangeKind, Entry, EntryNode};

    fn node(
        id: u64,
        name: &str,
        change: ChangeKind,
        children: Option<Vec<EntryNode>>,
    ) -> EntryNode {
        EntryNode {
            id,
            entry: Entry {
                name: name.to_string(),
                path: PathBuf::from("/l").join(name),
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
    fn counts_skip_directory_placeholders() {
        let entries = vec![node(
            1,
            "src",
            ChangeKind::Unknown,
            Some(vec![
                node(2, "a.rs", ChangeKind::Changed, None),
                node(3, "b.rs", ChangeKind::LeftOnly, None),
            ]),
        )];
        let report = build_report(
            "scan-1",
            &CompareConfig::with_roots("/l", "/r"),
            true,
            12,
            entries,
            Vec::new(),
        );

        assert_eq!(report.counts.changed, 1);
        assert_eq!(report.counts.left_only, 1);
        assert_eq!(report.counts.unknown, 0);
        assert_eq!(report.left_root, "/l");
        assert!(report.generated_at.ends_with('Z'));
    }

    #[test]
    fn written_report_loads_back() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("report.json");
        let report = build_report(
            "scan-2",
            &CompareConfig::with_roots("/l", "/r"),
            false,
            0,
            Vec::new(),
            vec!["invalid ignore pattern".to_string()],
        );
        write_report(&report, &path).expect("write");
        let loaded = load_report(&path).expect("load");
        assert_eq!(loaded.scan_id, "scan-2");
        assert_eq!(loaded.warnings, report.warnings);
        assert!(!loaded.has_changes);
    }
}
