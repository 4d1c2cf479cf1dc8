use crate::diff::ChangeSet;

/// Counts and file lists of a patch, in a form suitable for release notes.
#[derive(Debug, Clone)]
pub struct PatchSummary<'a> {
    pub release_name: &'a str,
    pub old_tag: &'a str,
    pub new_tag: &'a str,
    pub old_file_count: usize,
    pub new_file_count: usize,
    pub change_set: &'a ChangeSet,
}

impl PatchSummary<'_> {
    pub fn render(&self) -> String {
        let changed = self.change_set.changed();
        let removed = self.change_set.removed();

        let mut lines = vec![
            format!(
                "# {} Patch Summary (from {} version to {})",
                self.release_name, self.old_tag, self.new_tag
            ),
            String::new(),
            format!("Number of files in OLD: {}", self.old_file_count),
            format!("Number of files in NEW: {}", self.new_file_count),
            format!("Number of files in generated patch ZIP: {}", changed.len()),
            String::new(),
            "Modified files:".to_string(),
        ];
        lines.extend(changed.iter().cloned());
        lines.push(String::new());
        if removed.is_empty() {
            lines.push("No files were removed between the two versions.".to_string());
        } else {
            lines.push("Removed files:".to_string());
            lines.extend(removed.iter().cloned());
        }

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}
