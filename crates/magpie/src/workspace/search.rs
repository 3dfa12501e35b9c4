use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::process::Command;

use super::exec::{self, ExecError};
use crate::containment::ensure_contained;
use crate::errors::{ToolError, ToolResult};

const MAX_SEARCH_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

fn default_glob_limit() -> usize {
    50
}

fn default_grep_limit() -> usize {
    250
}

#[derive(Debug, Deserialize)]
pub(crate) struct GlobParams {
    pub pattern: String,
    pub path: Option<String>,
    #[serde(default = "default_glob_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GlobOutput {
    pub paths: Vec<String>,
    pub total: usize,
    pub search_path: String,
    pub pattern: String,
}

pub(crate) async fn glob_files(root: &Path, params: GlobParams) -> ToolResult<GlobOutput> {
    let search_path = ensure_contained(params.path.as_deref().unwrap_or("."), root)?;

    let full_pattern = format!("{}/{}", search_path.display(), params.pattern);
    let options = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        // Hidden files stay out unless the pattern names the leading dot
        require_literal_leading_dot: true,
    };
    let walker = glob::glob_with(&full_pattern, options).map_err(|e| {
        ToolError::InvalidParameters(format!("invalid glob pattern '{}': {}", params.pattern, e))
    })?;

    let mut matched = Vec::new();
    for entry in walker {
        let path = match entry {
            Ok(path) => path,
            Err(_) => continue,
        };
        if !path.is_file() {
            continue;
        }
        if ensure_contained(&path, root).is_err() {
            continue;
        }
        let modified = std::fs::metadata(&path)
            .and_then(|metadata| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        matched.push((path, modified));
    }

    // Newest first, ties broken by path so pagination stays stable
    matched.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let total = matched.len();
    let paths = matched
        .into_iter()
        .skip(params.offset)
        .take(params.limit)
        .map(|(path, _)| path.display().to_string())
        .collect();

    Ok(GlobOutput {
        paths,
        total,
        search_path: search_path.display().to_string(),
        pattern: params.pattern,
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn as_slice(&self) -> &[String] {
        match self {
            StringOrList::One(value) => std::slice::from_ref(value),
            StringOrList::Many(values) => values,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GrepParams {
    pub pattern: String,
    pub path: Option<String>,
    pub include: Option<StringOrList>,
    pub exclude: Option<StringOrList>,
    #[serde(default, rename = "caseSensitive")]
    pub case_sensitive: bool,
    #[serde(default = "default_grep_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct GrepMatch {
    pub file: String,
    pub line: u64,
    pub content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GrepOutput {
    pub matches: Vec<GrepMatch>,
    pub total: usize,
    pub search_path: String,
    pub pattern: String,
}

pub(crate) async fn grep(
    root: &Path,
    program: &str,
    timeout: Duration,
    params: GrepParams,
) -> ToolResult<GrepOutput> {
    let search_path = ensure_contained(params.path.as_deref().unwrap_or("."), root)?;
    let args = build_search_args(&params, &search_path);

    let mut command = Command::new(program);
    command.args(&args);

    let output = exec::run_with_limits(command, timeout, MAX_SEARCH_OUTPUT_BYTES)
        .await
        .map_err(|e| match e {
            ExecError::TimedOut => ToolError::Search(format!(
                "search timed out after {} seconds",
                timeout.as_secs()
            )),
            ExecError::OutputTooLarge => ToolError::Search(format!(
                "search output exceeded {} bytes",
                MAX_SEARCH_OUTPUT_BYTES
            )),
            ExecError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ToolError::Search(
                "ripgrep (rg) is not installed. Please install it: \
                 https://github.com/BurntSushi/ripgrep#installation"
                    .to_string(),
            ),
            ExecError::Io(e) => ToolError::Search(format!("failed to run {}: {}", program, e)),
        })?;

    match output.status.code() {
        Some(0) => {}
        // ripgrep exits 1 when nothing matched
        Some(1) => {
            return Ok(GrepOutput {
                matches: Vec::new(),
                total: 0,
                search_path: search_path.display().to_string(),
                pattern: params.pattern,
            })
        }
        _ => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ToolError::Search(format!(
                "search failed with {}{}",
                output.status,
                if stderr.trim().is_empty() {
                    String::new()
                } else {
                    format!(": {}", stderr.trim())
                }
            )));
        }
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut all_matches = Vec::new();
    for line in stdout.lines().filter(|line| !line.is_empty()) {
        all_matches.push(parse_match_line(line)?);
    }

    let total = all_matches.len();
    let matches = all_matches
        .into_iter()
        .skip(params.offset)
        .take(params.limit)
        .collect();

    Ok(GrepOutput {
        matches,
        total,
        search_path: search_path.display().to_string(),
        pattern: params.pattern,
    })
}

fn build_search_args(params: &GrepParams, search_path: &Path) -> Vec<String> {
    let mut args = vec![params.pattern.clone(), search_path.display().to_string()];

    if !params.case_sensitive {
        args.push("-i".to_string());
    }
    args.push("-n".to_string());
    args.push("--no-heading".to_string());
    args.push("--with-filename".to_string());

    if let Some(include) = &params.include {
        for pattern in include.as_slice() {
            args.push("-g".to_string());
            args.push(pattern.clone());
        }
    }
    if let Some(exclude) = &params.exclude {
        for pattern in exclude.as_slice() {
            args.push("-g".to_string());
            args.push(format!("!{}", pattern));
        }
    }

    args
}

/// Parse one `file:line:content` line of search output
fn parse_match_line(line: &str) -> ToolResult<GrepMatch> {
    let mut parts = line.splitn(3, ':');
    if let (Some(file), Some(number), Some(content)) = (parts.next(), parts.next(), parts.next()) {
        if let Ok(line_number) = number.parse::<u64>() {
            return Ok(GrepMatch {
                file: file.to_string(),
                line: line_number,
                content: content.to_string(),
            });
        }
    }
    Err(ToolError::Search(format!(
        "unexpected search output line: {}",
        line
    )))
}
