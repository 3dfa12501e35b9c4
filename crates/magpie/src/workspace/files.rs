use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::containment::ensure_contained;
use crate::errors::{ToolError, ToolResult};

#[derive(Debug, Deserialize)]
pub(crate) struct ReadParams {
    pub path: String,
    pub read_range: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReadOutput {
    pub path: String,
    pub content: String,
    pub total_lines: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_range: Option<[i64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_range: Option<[i64; 2]>,
}

pub(crate) async fn read(root: &Path, params: ReadParams) -> ToolResult<ReadOutput> {
    let path = ensure_contained(&params.path, root)?;
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| ToolError::FileRead(format!("{}: {}", path.display(), e)))?;

    // Split on '\n' so a trailing newline counts as a final empty line,
    // keeping line numbers consistent with editors
    let lines: Vec<&str> = content.split('\n').collect();
    let total_lines = lines.len();

    match params.read_range {
        Some(range) => {
            let [start_line, end_line] = range_pair(&range)?;
            let start = (start_line.max(1) - 1) as usize;
            let end = end_line.clamp(0, total_lines as i64) as usize;
            let selected = lines.get(start..end).unwrap_or(&[]);

            Ok(ReadOutput {
                path: path.display().to_string(),
                content: selected.join("\n"),
                total_lines,
                read_range: Some([start_line, end_line]),
                actual_range: Some([start as i64 + 1, end as i64]),
            })
        }
        None => Ok(ReadOutput {
            path: path.display().to_string(),
            content,
            total_lines,
            read_range: None,
            actual_range: None,
        }),
    }
}

fn range_pair(range: &[i64]) -> ToolResult<[i64; 2]> {
    match range {
        [start, end] => Ok([*start, *end]),
        _ => Err(ToolError::InvalidParameters(
            "read_range must be [startLine, endLine]".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListDirParams {
    pub path: String,
    pub ignore: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Serialize)]
pub(crate) struct DirEntryInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListDirOutput {
    pub path: String,
    pub entries: Vec<DirEntryInfo>,
    pub total_entries: usize,
}

pub(crate) async fn list_dir(root: &Path, params: ListDirParams) -> ToolResult<ListDirOutput> {
    let path = ensure_contained(&params.path, root)?;

    let mut ignore_patterns = Vec::new();
    for pattern in params.ignore.unwrap_or_default() {
        let compiled = glob::Pattern::new(&pattern).map_err(|e| {
            ToolError::InvalidParameters(format!("invalid ignore pattern '{}': {}", pattern, e))
        })?;
        ignore_patterns.push(compiled);
    }

    let mut reader = tokio::fs::read_dir(&path)
        .await
        .map_err(|e| ToolError::DirectoryRead(format!("{}: {}", path.display(), e)))?;

    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| ToolError::DirectoryRead(format!("{}: {}", path.display(), e)))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if ignore_patterns.iter().any(|pattern| pattern.matches(&name)) {
            continue;
        }

        let metadata = entry
            .metadata()
            .await
            .map_err(|e| ToolError::DirectoryRead(format!("{}: {}", name, e)))?;

        let (kind, size) = if metadata.is_dir() {
            (EntryKind::Directory, None)
        } else {
            (EntryKind::File, Some(metadata.len()))
        };
        entries.push(DirEntryInfo { name, kind, size });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    let total_entries = entries.len();

    Ok(ListDirOutput {
        path: path.display().to_string(),
        entries,
        total_entries,
    })
}

fn default_create_dirs() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub(crate) struct WriteFileParams {
    pub path: String,
    pub content: String,
    #[serde(default = "default_create_dirs", rename = "createDirs")]
    pub create_dirs: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WriteFileOutput {
    pub path: String,
    pub bytes_written: usize,
    pub success: bool,
}

pub(crate) async fn write_file(root: &Path, params: WriteFileParams) -> ToolResult<WriteFileOutput> {
    let path = ensure_contained(&params.path, root)?;

    if params.create_dirs {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::FileWrite(format!("{}: {}", parent.display(), e)))?;
        }
    }

    tokio::fs::write(&path, &params.content)
        .await
        .map_err(|e| ToolError::FileWrite(format!("{}: {}", path.display(), e)))?;

    Ok(WriteFileOutput {
        path: path.display().to_string(),
        bytes_written: params.content.len(),
        success: true,
    })
}

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
pub(crate) struct EditFileParams {
    pub path: String,
    pub find: String,
    pub replace: String,
    #[serde(default, rename = "replaceAll")]
    pub replace_all: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EditFileOutput {
    pub path: String,
    pub replacements: usize,
    pub success: bool,
    pub preview: String,
}

pub(crate) async fn edit_file(root: &Path, params: EditFileParams) -> ToolResult<EditFileOutput> {
    let path = ensure_contained(&params.path, root)?;

    if params.find.is_empty() {
        return Err(ToolError::InvalidParameters(
            "'find' must not be empty".to_string(),
        ));
    }

    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| ToolError::FileEdit(format!("{}: {}", path.display(), e)))?;

    // The find string is matched literally, never as a regex
    let (new_content, replacements) = if params.replace_all {
        let count = content.matches(&params.find).count();
        (content.replace(&params.find, &params.replace), count)
    } else {
        let count = usize::from(content.contains(&params.find));
        (
            content.replacen(&params.find, &params.replace, 1),
            count,
        )
    };

    tokio::fs::write(&path, &new_content)
        .await
        .map_err(|e| ToolError::FileEdit(format!("{}: {}", path.display(), e)))?;

    Ok(EditFileOutput {
        path: path.display().to_string(),
        replacements,
        success: true,
        preview: preview(&new_content),
    })
}

fn preview(content: &str) -> String {
    let mut short: String = content.chars().take(PREVIEW_CHARS).collect();
    if content.chars().count() > PREVIEW_CHARS {
        short.push_str("...");
    }
    short
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn workspace() -> (tempfile::TempDir, PathBuf) {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        (temp_dir, root)
    }

    fn read_params(path: &str, range: Option<Vec<i64>>) -> ReadParams {
        ReadParams {
            path: path.to_string(),
            read_range: range,
        }
    }

    #[tokio::test]
    async fn test_read_whole_file() {
        let (_guard, root) = workspace();
        std::fs::write(root.join("a.txt"), "one\ntwo\nthree").unwrap();

        let output = read(&root, read_params("a.txt", None)).await.unwrap();
        assert_eq!(output.content, "one\ntwo\nthree");
        assert_eq!(output.total_lines, 3);
        assert_eq!(output.actual_range, None);
    }

    #[tokio::test]
    async fn test_read_range_returns_exact_lines() {
        let (_guard, root) = workspace();
        std::fs::write(root.join("a.txt"), "line1\nline2\nline3\nline4\nline5").unwrap();

        let output = read(&root, read_params("a.txt", Some(vec![2, 3])))
            .await
            .unwrap();
        assert_eq!(output.content, "line2\nline3");
        assert_eq!(output.total_lines, 5);
        assert_eq!(output.read_range, Some([2, 3]));
        assert_eq!(output.actual_range, Some([2, 3]));
    }

    #[tokio::test]
    async fn test_read_range_clamps_past_end_of_file() {
        let (_guard, root) = workspace();
        std::fs::write(root.join("a.txt"), "line1\nline2\nline3\nline4\nline5").unwrap();

        let output = read(&root, read_params("a.txt", Some(vec![4, 99])))
            .await
            .unwrap();
        assert_eq!(output.content, "line4\nline5");
        assert_eq!(output.actual_range, Some([4, 5]));
    }

    #[tokio::test]
    async fn test_read_counts_trailing_newline_as_a_line() {
        let (_guard, root) = workspace();
        std::fs::write(root.join("a.txt"), "a\nb\n").unwrap();

        let output = read(&root, read_params("a.txt", None)).await.unwrap();
        assert_eq!(output.total_lines, 3);
    }

    #[tokio::test]
    async fn test_read_rejects_malformed_range() {
        let (_guard, root) = workspace();
        std::fs::write(root.join("a.txt"), "one").unwrap();

        let error = read(&root, read_params("a.txt", Some(vec![2])))
            .await
            .unwrap_err();
        assert!(matches!(error, ToolError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let (_guard, root) = workspace();

        let error = read(&root, read_params("missing.txt", None))
            .await
            .unwrap_err();
        assert!(matches!(error, ToolError::FileRead(_)));
    }

    #[tokio::test]
    async fn test_list_dir_reports_types_and_sizes() {
        let (_guard, root) = workspace();
        std::fs::write(root.join("a.txt"), "hello").unwrap();
        std::fs::create_dir(root.join("sub")).unwrap();

        let output = list_dir(
            &root,
            ListDirParams {
                path: ".".to_string(),
                ignore: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(output.total_entries, 2);
        assert_eq!(output.entries[0].name, "a.txt");
        assert!(matches!(output.entries[0].kind, EntryKind::File));
        assert_eq!(output.entries[0].size, Some(5));
        assert_eq!(output.entries[1].name, "sub");
        assert!(matches!(output.entries[1].kind, EntryKind::Directory));
        assert_eq!(output.entries[1].size, None);
    }

    #[tokio::test]
    async fn test_list_dir_ignore_patterns_filter_names() {
        let (_guard, root) = workspace();
        std::fs::write(root.join("a.txt"), "").unwrap();
        std::fs::write(root.join("b.log"), "").unwrap();

        let output = list_dir(
            &root,
            ListDirParams {
                path: ".".to_string(),
                ignore: Some(vec!["*.log".to_string()]),
            },
        )
        .await
        .unwrap();

        assert_eq!(output.total_entries, 1);
        assert_eq!(output.entries[0].name, "a.txt");
    }

    #[tokio::test]
    async fn test_list_dir_missing_directory() {
        let (_guard, root) = workspace();

        let error = list_dir(
            &root,
            ListDirParams {
                path: "missing".to_string(),
                ignore: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(error, ToolError::DirectoryRead(_)));
    }

    #[tokio::test]
    async fn test_write_file_creates_parent_directories() {
        let (_guard, root) = workspace();

        let output = write_file(
            &root,
            WriteFileParams {
                path: "deep/nested/file.txt".to_string(),
                content: "héllo".to_string(),
                create_dirs: true,
            },
        )
        .await
        .unwrap();

        assert_eq!(output.bytes_written, 6);
        assert!(output.success);
        assert_eq!(
            std::fs::read_to_string(root.join("deep/nested/file.txt")).unwrap(),
            "héllo"
        );
    }

    #[tokio::test]
    async fn test_write_file_without_create_dirs_fails_on_missing_parent() {
        let (_guard, root) = workspace();

        let error = write_file(
            &root,
            WriteFileParams {
                path: "missing/file.txt".to_string(),
                content: "hello".to_string(),
                create_dirs: false,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(error, ToolError::FileWrite(_)));
    }

    fn edit_params(path: &str, find: &str, replace: &str, replace_all: bool) -> EditFileParams {
        EditFileParams {
            path: path.to_string(),
            find: find.to_string(),
            replace: replace.to_string(),
            replace_all,
        }
    }

    #[tokio::test]
    async fn test_edit_file_replaces_first_occurrence() {
        let (_guard, root) = workspace();
        std::fs::write(root.join("a.txt"), "a-a-a").unwrap();

        let output = edit_file(&root, edit_params("a.txt", "a", "b", false))
            .await
            .unwrap();

        assert_eq!(output.replacements, 1);
        assert_eq!(std::fs::read_to_string(root.join("a.txt")).unwrap(), "b-a-a");
    }

    #[tokio::test]
    async fn test_edit_file_replaces_all_occurrences() {
        let (_guard, root) = workspace();
        std::fs::write(root.join("a.txt"), "a-a-a").unwrap();

        let output = edit_file(&root, edit_params("a.txt", "a", "b", true))
            .await
            .unwrap();

        assert_eq!(output.replacements, 3);
        assert_eq!(std::fs::read_to_string(root.join("a.txt")).unwrap(), "b-b-b");
    }

    #[tokio::test]
    async fn test_edit_file_zero_replacements_is_success() {
        let (_guard, root) = workspace();
        std::fs::write(root.join("a.txt"), "hello").unwrap();

        let output = edit_file(&root, edit_params("a.txt", "absent", "x", false))
            .await
            .unwrap();

        assert_eq!(output.replacements, 0);
        assert!(output.success);
        assert_eq!(std::fs::read_to_string(root.join("a.txt")).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_edit_file_find_is_literal_not_regex() {
        let (_guard, root) = workspace();
        std::fs::write(root.join("a.txt"), "abc a.c").unwrap();

        let output = edit_file(&root, edit_params("a.txt", "a.c", "x", true))
            .await
            .unwrap();

        assert_eq!(output.replacements, 1);
        assert_eq!(std::fs::read_to_string(root.join("a.txt")).unwrap(), "abc x");
    }

    #[tokio::test]
    async fn test_edit_file_preview_is_truncated() {
        let (_guard, root) = workspace();
        std::fs::write(root.join("a.txt"), "x".repeat(300)).unwrap();

        let output = edit_file(&root, edit_params("a.txt", "x", "y", false))
            .await
            .unwrap();

        assert_eq!(output.preview.chars().count(), PREVIEW_CHARS + 3);
        assert!(output.preview.ends_with("..."));
    }
}
