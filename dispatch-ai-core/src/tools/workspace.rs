use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use git2::{IndexAddOption, Repository, Status, StatusOptions};
use globset::Glob;
use ignore::WalkBuilder;
use regex::RegexBuilder;
use reqwest::Url;
use serde_json::Value;

use crate::config::schema::WorkspaceConfig;
use crate::error::{Error, Result};
use crate::tools::types::{
    CommitArgs, EditArgs, MoveArgs, SearchArgs, ToolBackend, ToolInvocation, ToolOutput, WriteArgs,
};

const MAX_SEARCH_FILE_BYTES: u64 = 4 * 1024 * 1024;
const MAX_MATCH_LINE_CHARS: usize = 200;
const MAX_LOG_ENTRIES: usize = 50;
const LOOKUP_TIMEOUT_SECS: u64 = 15;

/// Tool backend over a directory on the local disk. Paths never leave `root`.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
    config: WorkspaceConfig,
    client: reqwest::Client,
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let _ = normalized.pop();
            }
            _ => normalized.push(component.as_os_str()),
        }
    }
    normalized
}

/// Resolves symlinks for the part of `path` that exists.
fn canonical_prefix(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map(|parent| parent.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

fn status_label(status: Status) -> &'static str {
    if status.intersects(Status::WT_NEW | Status::INDEX_NEW) {
        "new"
    } else if status.intersects(Status::WT_DELETED | Status::INDEX_DELETED) {
        "deleted"
    } else if status.intersects(Status::WT_RENAMED | Status::INDEX_RENAMED) {
        "renamed"
    } else if status.intersects(Status::WT_MODIFIED | Status::INDEX_MODIFIED) {
        "modified"
    } else {
        "changed"
    }
}

/// Condenses an instant-answer style JSON response into a few lines.
fn summarize_lookup(body: &Value, query: &str) -> String {
    let mut lines = Vec::new();
    for key in ["Answer", "AbstractText", "Definition"] {
        if let Some(text) = body.get(key).and_then(Value::as_str) {
            if !text.trim().is_empty() {
                lines.push(text.trim().to_owned());
            }
        }
    }
    if let Some(source) = body.get("AbstractURL").and_then(Value::as_str) {
        if !source.is_empty() && !lines.is_empty() {
            lines.push(format!("Source: {source}"));
        }
    }

    let related = body
        .get("RelatedTopics")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|topic| topic.get("Text").and_then(Value::as_str))
        .filter(|text| !text.trim().is_empty())
        .take(5);
    for text in related {
        lines.push(format!("- {}", text.trim()));
    }

    if lines.is_empty() {
        format!("no summary found for '{query}'")
    } else {
        lines.join("\n")
    }
}

impl LocalWorkspace {
    pub fn new(config: WorkspaceConfig) -> Result<Self> {
        let root = fs::canonicalize(&config.root).map_err(|err| {
            Error::Config(format!(
                "workspace root '{}' is not accessible: {err}",
                config.root
            ))
        })?;
        if !root.is_dir() {
            return Err(Error::Config(format!(
                "workspace root '{}' is not a directory",
                root.display()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LOOKUP_TIMEOUT_SECS))
            .user_agent(concat!("dispatch-ai/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| Error::Config(format!("failed to build http client: {err}")))?;

        Ok(Self {
            root,
            config,
            client,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, raw_path: &str) -> Result<PathBuf> {
        let raw_path = raw_path.trim();
        if raw_path.is_empty() {
            return Err(Error::Tool("path must be non-empty".to_owned()));
        }

        let raw = Path::new(raw_path);
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.root.join(raw)
        };
        let effective = canonical_prefix(&normalize_path(&joined));

        if !effective.starts_with(&self.root) {
            return Err(Error::Tool(format!(
                "path '{raw_path}' is outside the workspace"
            )));
        }
        Ok(effective)
    }

    fn relative(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_owned(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => path.display().to_string(),
        }
    }

    async fn blocking<F>(&self, label: &'static str, job: F) -> Result<ToolOutput>
    where
        F: FnOnce(LocalWorkspace) -> Result<ToolOutput> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || job(this))
            .await
            .map_err(|err| Error::Tool(format!("{label} task failed: {err}")))?
    }

    fn list(&self, raw_path: Option<&str>) -> Result<ToolOutput> {
        let dir = match raw_path {
            Some(raw) => self.resolve(raw)?,
            None => self.root.clone(),
        };
        if !dir.is_dir() {
            return Err(Error::Tool(format!(
                "'{}' is not a directory",
                self.relative(&dir)
            )));
        }

        let mut builder = WalkBuilder::new(&dir);
        builder
            .max_depth(Some(1))
            .git_ignore(true)
            .parents(true)
            .require_git(false);

        let mut entries = Vec::new();
        for entry in builder.build() {
            let Ok(entry) = entry else {
                continue;
            };
            if entry.depth() == 0 {
                continue;
            }
            let path = entry.path();
            let rel = self.relative(path);
            if path.is_dir() {
                entries.push(format!("{rel}/"));
            } else {
                let size = entry.metadata().map(|meta| meta.len()).unwrap_or_default();
                entries.push(format!("{rel} ({size} bytes)"));
            }
        }
        entries.sort();

        if entries.is_empty() {
            return Ok(ToolOutput::ok(format!(
                "'{}' is empty",
                self.relative(&dir)
            )));
        }
        Ok(ToolOutput::ok(entries.join("\n")))
    }

    fn search(&self, args: &SearchArgs) -> Result<ToolOutput> {
        let search_root = match args.path.as_deref() {
            Some(raw) => self.resolve(raw)?,
            None => self.root.clone(),
        };

        let regex = RegexBuilder::new(&args.query)
            .case_insensitive(true)
            .build()
            .or_else(|_| {
                RegexBuilder::new(&regex::escape(&args.query))
                    .case_insensitive(true)
                    .build()
            })
            .map_err(|err| Error::Tool(format!("invalid search pattern: {err}")))?;

        let glob_matcher = match args.glob.as_deref() {
            Some(glob) => Some(
                Glob::new(glob)
                    .map_err(|err| Error::Tool(format!("invalid glob '{glob}': {err}")))?
                    .compile_matcher(),
            ),
            None => None,
        };

        let mut builder = WalkBuilder::new(&search_root);
        builder
            .git_ignore(true)
            .parents(true)
            .require_git(false)
            .max_filesize(Some(MAX_SEARCH_FILE_BYTES));

        let max_hits = self.config.max_search_hits.max(1);
        let mut hits = Vec::new();
        let mut truncated = false;

        'files: for entry in builder.build() {
            let Ok(entry) = entry else {
                continue;
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(matcher) = glob_matcher.as_ref() {
                let rel = path.strip_prefix(&search_root).unwrap_or(path);
                if !matcher.is_match(rel) {
                    continue;
                }
            }
            let Ok(content) = fs::read_to_string(path) else {
                continue;
            };

            for (index, line) in content.lines().enumerate() {
                if !regex.is_match(line) {
                    continue;
                }
                if hits.len() >= max_hits {
                    truncated = true;
                    break 'files;
                }
                hits.push(format!(
                    "{}:{}: {}",
                    self.relative(path),
                    index + 1,
                    truncate_chars(line.trim(), MAX_MATCH_LINE_CHARS)
                ));
            }
        }

        if hits.is_empty() {
            return Ok(ToolOutput::ok(format!("no matches for '{}'", args.query)));
        }
        let mut text = hits.join("\n");
        if truncated {
            text.push_str(&format!("\n(stopped after {max_hits} matches)"));
        }
        Ok(ToolOutput::ok(text))
    }

    fn read(&self, raw_path: &str) -> Result<ToolOutput> {
        let path = self.resolve(raw_path)?;
        let metadata = fs::metadata(&path)
            .map_err(|_| Error::Tool(format!("file '{raw_path}' does not exist")))?;
        if metadata.is_dir() {
            return Err(Error::Tool(format!(
                "'{raw_path}' is a directory; use list instead"
            )));
        }
        if metadata.len() > self.config.max_read_bytes {
            return Err(Error::Tool(format!(
                "file '{raw_path}' is too large to read ({} bytes, limit {})",
                metadata.len(),
                self.config.max_read_bytes
            )));
        }

        let content = fs::read_to_string(&path)
            .map_err(|err| Error::Tool(format!("failed to read '{raw_path}': {err}")))?;
        if content.is_empty() {
            return Ok(ToolOutput::ok(format!("'{raw_path}' is empty")));
        }
        Ok(ToolOutput::ok(content))
    }

    fn write(&self, args: &WriteArgs) -> Result<ToolOutput> {
        let path = self.resolve(&args.path)?;
        if path.is_dir() {
            return Err(Error::Tool(format!("'{}' is a directory", args.path)));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                Error::Tool(format!("failed to create '{}': {err}", parent.display()))
            })?;
        }
        fs::write(&path, &args.content)
            .map_err(|err| Error::Tool(format!("failed to write '{}': {err}", args.path)))?;

        Ok(ToolOutput::ok(format!(
            "wrote {} bytes to {}",
            args.content.len(),
            self.relative(&path)
        )))
    }

    fn edit(&self, args: &EditArgs) -> Result<ToolOutput> {
        let path = self.resolve(&args.path)?;
        let content = fs::read_to_string(&path)
            .map_err(|_| Error::Tool(format!("file '{}' does not exist", args.path)))?;

        let occurrences = content.matches(args.find.as_str()).count();
        if occurrences == 0 {
            return Err(Error::Tool(format!(
                "text to replace was not found in '{}'; read the file and copy the exact text",
                args.path
            )));
        }

        let updated = content.replace(args.find.as_str(), &args.replace);
        fs::write(&path, updated)
            .map_err(|err| Error::Tool(format!("failed to write '{}': {err}", args.path)))?;

        Ok(ToolOutput::ok(format!(
            "replaced {occurrences} occurrence(s) in {}",
            self.relative(&path)
        )))
    }

    fn delete(&self, raw_path: &str) -> Result<ToolOutput> {
        let path = self.resolve(raw_path)?;
        if path == self.root || path.is_dir() {
            return Err(Error::Tool(format!(
                "refusing to delete directory '{raw_path}'"
            )));
        }
        fs::remove_file(&path)
            .map_err(|err| Error::Tool(format!("failed to delete '{raw_path}': {err}")))?;
        Ok(ToolOutput::ok(format!("deleted {}", self.relative(&path))))
    }

    fn move_file(&self, args: &MoveArgs) -> Result<ToolOutput> {
        let from = self.resolve(&args.from)?;
        let to = self.resolve(&args.to)?;
        if !from.exists() {
            return Err(Error::Tool(format!("'{}' does not exist", args.from)));
        }
        if to.exists() {
            return Err(Error::Tool(format!(
                "'{}' already exists; delete it first or pick another name",
                args.to
            )));
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                Error::Tool(format!("failed to create '{}': {err}", parent.display()))
            })?;
        }
        fs::rename(&from, &to).map_err(|err| {
            Error::Tool(format!(
                "failed to move '{}' to '{}': {err}",
                args.from, args.to
            ))
        })?;

        Ok(ToolOutput::ok(format!(
            "moved {} to {}",
            self.relative(&from),
            self.relative(&to)
        )))
    }

    fn open_repo(&self) -> Result<Repository> {
        Repository::discover(&self.root).map_err(|err| {
            Error::Tool(format!(
                "workspace '{}' is not inside a git repository: {err}",
                self.root.display()
            ))
        })
    }

    fn status(&self) -> Result<ToolOutput> {
        let repo = self.open_repo()?;
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_unmodified(false);

        let statuses = repo
            .statuses(Some(&mut options))
            .map_err(|err| Error::Tool(format!("failed to read git status: {err}")))?;

        let lines: Vec<String> = statuses
            .iter()
            .map(|entry| {
                format!(
                    "{} {}",
                    status_label(entry.status()),
                    entry.path().unwrap_or_default()
                )
            })
            .collect();

        if lines.is_empty() {
            return Ok(ToolOutput::ok("working tree clean"));
        }
        Ok(ToolOutput::ok(lines.join("\n")))
    }

    fn log(&self, limit: Option<usize>) -> Result<ToolOutput> {
        let repo = self.open_repo()?;
        let limit = limit.unwrap_or(10).clamp(1, MAX_LOG_ENTRIES);

        let mut revwalk = repo
            .revwalk()
            .map_err(|err| Error::Tool(format!("failed to initialize revwalk: {err}")))?;
        if revwalk.push_head().is_err() {
            return Ok(ToolOutput::ok("no commits yet"));
        }

        let mut lines = Vec::new();
        for oid in revwalk.take(limit).flatten() {
            let commit = repo
                .find_commit(oid)
                .map_err(|err| Error::Tool(format!("failed to load commit {oid}: {err}")))?;
            let id = oid.to_string();
            lines.push(format!(
                "{} {} ({})",
                &id[..id.len().min(8)],
                commit.summary().unwrap_or_default(),
                commit.author().name().unwrap_or_default()
            ));
        }
        Ok(ToolOutput::ok(lines.join("\n")))
    }

    fn commit(&self, args: &CommitArgs) -> Result<ToolOutput> {
        let repo = self.open_repo()?;
        let workdir = repo
            .workdir()
            .map(canonical_prefix)
            .ok_or_else(|| Error::Tool("cannot commit in a bare repository".to_owned()))?;

        let mut index = repo
            .index()
            .map_err(|err| Error::Tool(format!("failed to read index: {err}")))?;

        if args.paths.is_empty() {
            index
                .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
                .map_err(|err| Error::Tool(format!("failed to stage files: {err}")))?;
            index
                .update_all(["*"].iter(), None)
                .map_err(|err| Error::Tool(format!("failed to stage removals: {err}")))?;
        } else {
            for raw in &args.paths {
                let path = self.resolve(raw)?;
                let rel = path.strip_prefix(&workdir).map_err(|_| {
                    Error::Tool(format!("'{raw}' is outside the repository"))
                })?;
                let staged = if path.exists() {
                    index.add_path(rel)
                } else {
                    index.remove_path(rel)
                };
                staged.map_err(|err| Error::Tool(format!("failed to stage '{raw}': {err}")))?;
            }
        }

        index
            .write()
            .map_err(|err| Error::Tool(format!("failed to write index: {err}")))?;
        let tree_id = index
            .write_tree()
            .map_err(|err| Error::Tool(format!("failed to write tree: {err}")))?;
        let tree = repo
            .find_tree(tree_id)
            .map_err(|err| Error::Tool(format!("failed to load tree: {err}")))?;

        let parent = match repo.head() {
            Ok(head) => Some(
                head.peel_to_commit()
                    .map_err(|err| Error::Tool(format!("failed to load HEAD commit: {err}")))?,
            ),
            Err(_) => None,
        };
        if parent.as_ref().is_some_and(|parent| parent.tree_id() == tree_id) {
            return Err(Error::Tool("nothing to commit".to_owned()));
        }

        let signature = git2::Signature::now(
            &self.config.commit_author_name,
            &self.config.commit_author_email,
        )
        .map_err(|err| Error::Tool(format!("failed to build commit signature: {err}")))?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        let commit_id = repo
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                &args.message,
                &tree,
                &parents,
            )
            .map_err(|err| Error::Tool(format!("failed to create commit: {err}")))?;

        let id = commit_id.to_string();
        Ok(ToolOutput::ok(format!(
            "committed {}: {}",
            &id[..id.len().min(8)],
            args.message
        )))
    }

    async fn web_lookup(&self, query: &str) -> Result<ToolOutput> {
        let url = Url::parse_with_params(
            &self.config.web_lookup_url,
            &[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ],
        )
        .map_err(|err| Error::Config(format!("invalid web_lookup_url: {err}")))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| Error::Tool(format!("web lookup failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Tool(format!(
                "web lookup returned HTTP {}",
                status.as_u16()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|err| Error::Tool(format!("web lookup returned invalid JSON: {err}")))?;

        Ok(ToolOutput::ok(summarize_lookup(&body, query)))
    }
}

#[async_trait]
impl ToolBackend for LocalWorkspace {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        match invocation {
            ToolInvocation::List(args) => {
                let path = args.path.clone();
                self.blocking("list", move |ws| ws.list(path.as_deref())).await
            }
            ToolInvocation::Search(args) => {
                let args = args.clone();
                self.blocking("search", move |ws| ws.search(&args)).await
            }
            ToolInvocation::Read(args) => {
                let path = args.path.clone();
                self.blocking("read", move |ws| ws.read(&path)).await
            }
            ToolInvocation::Status => self.blocking("status", |ws| ws.status()).await,
            ToolInvocation::Log(args) => {
                let limit = args.limit;
                self.blocking("log", move |ws| ws.log(limit)).await
            }
            ToolInvocation::WebLookup(args) => self.web_lookup(&args.query).await,
            ToolInvocation::Write(args) => {
                let args = args.clone();
                self.blocking("write", move |ws| ws.write(&args)).await
            }
            ToolInvocation::Edit(args) => {
                let args = args.clone();
                self.blocking("edit", move |ws| ws.edit(&args)).await
            }
            ToolInvocation::Delete(args) => {
                let path = args.path.clone();
                self.blocking("delete", move |ws| ws.delete(&path)).await
            }
            ToolInvocation::Move(args) => {
                let args = args.clone();
                self.blocking("move", move |ws| ws.move_file(&args)).await
            }
            ToolInvocation::Commit(args) => {
                let args = args.clone();
                self.blocking("commit", move |ws| ws.commit(&args)).await
            }
            ToolInvocation::SwitchModel(_) => Err(Error::Tool(
                "switch_model is not a workspace operation".to_owned(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::types::{ListArgs, PathArgs};
    use serde_json::json;

    fn workspace(dir: &tempfile::TempDir) -> LocalWorkspace {
        LocalWorkspace::new(WorkspaceConfig {
            root: dir.path().display().to_string(),
            ..WorkspaceConfig::default()
        })
        .expect("workspace")
    }

    async fn run(ws: &LocalWorkspace, name: &str, args: Value) -> Result<ToolOutput> {
        let invocation = ToolInvocation::parse(name, &args.to_string()).expect("valid invocation");
        ws.execute(&invocation).await
    }

    #[tokio::test]
    async fn write_read_and_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace(&dir);

        run(&ws, "write", json!({"path": "src/app.js", "content": "let x = 1;"}))
            .await
            .expect("write");

        let read = run(&ws, "read", json!({"path": "src/app.js"})).await.expect("read");
        assert_eq!(read.text, "let x = 1;");

        let root = ws
            .execute(&ToolInvocation::List(ListArgs { path: None }))
            .await
            .expect("list root");
        assert_eq!(root.text, "src/");

        let src = run(&ws, "list", json!({"path": "src"})).await.expect("list src");
        assert_eq!(src.text, "src/app.js (10 bytes)");
    }

    #[tokio::test]
    async fn edit_requires_an_exact_match() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace(&dir);
        run(&ws, "write", json!({"path": "game.js", "content": "setInterval(tick, 1000);"}))
            .await
            .expect("write");

        let missing = run(
            &ws,
            "edit",
            json!({"path": "game.js", "find": "2000", "replace": "500"}),
        )
        .await;
        assert!(matches!(missing, Err(Error::Tool(message)) if message.contains("not found")));

        let edited = run(
            &ws,
            "edit",
            json!({"path": "game.js", "find": "1000", "replace": "500"}),
        )
        .await
        .expect("edit");
        assert!(edited.text.contains("replaced 1 occurrence"));

        let content = fs::read_to_string(dir.path().join("game.js")).expect("file");
        assert_eq!(content, "setInterval(tick, 500);");
    }

    #[tokio::test]
    async fn paths_outside_the_root_are_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace(&dir);

        for path in ["../outside.txt", "/etc/passwd", "src/../../escape.txt"] {
            let result = ws
                .execute(&ToolInvocation::Read(PathArgs {
                    path: path.to_owned(),
                }))
                .await;
            assert!(
                matches!(&result, Err(Error::Tool(message)) if message.contains("outside the workspace")),
                "{path} should be refused, got {result:?}"
            );
        }
    }

    #[tokio::test]
    async fn search_honours_glob_filter() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace(&dir);
        run(&ws, "write", json!({"path": "src/game.js", "content": "const timer = 1000;\n"}))
            .await
            .expect("write js");
        run(&ws, "write", json!({"path": "notes.txt", "content": "timer notes\n"}))
            .await
            .expect("write txt");

        let all = run(&ws, "search", json!({"query": "TIMER"})).await.expect("search");
        assert!(all.text.contains("src/game.js:1: const timer = 1000;"));
        assert!(all.text.contains("notes.txt:1"));

        let js_only = run(&ws, "search", json!({"query": "timer", "glob": "*.js"}))
            .await
            .expect("search js");
        assert!(js_only.text.contains("src/game.js"));
        assert!(!js_only.text.contains("notes.txt"));

        let none = run(&ws, "search", json!({"query": "(unbalanced"})).await.expect("escaped");
        assert_eq!(none.text, "no matches for '(unbalanced'");
    }

    #[tokio::test]
    async fn move_and_delete_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ws = workspace(&dir);
        run(&ws, "write", json!({"path": "a.txt", "content": "hi"}))
            .await
            .expect("write");

        run(&ws, "move", json!({"from": "a.txt", "to": "docs/b.txt"}))
            .await
            .expect("move");
        assert!(run(&ws, "read", json!({"path": "a.txt"})).await.is_err());
        assert_eq!(
            run(&ws, "read", json!({"path": "docs/b.txt"})).await.expect("read").text,
            "hi"
        );

        assert!(run(&ws, "delete", json!({"path": "docs"})).await.is_err());
        run(&ws, "delete", json!({"path": "docs/b.txt"}))
            .await
            .expect("delete");
        assert!(!dir.path().join("docs/b.txt").exists());
    }

    #[tokio::test]
    async fn git_status_commit_and_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        Repository::init(dir.path()).expect("git init");
        let ws = workspace(&dir);

        assert_eq!(
            ws.execute(&ToolInvocation::Log(crate::tools::types::LogArgs { limit: None }))
                .await
                .expect("log")
                .text,
            "no commits yet"
        );

        run(&ws, "write", json!({"path": "index.html", "content": "<h1>hi</h1>"}))
            .await
            .expect("write");
        let status = ws.execute(&ToolInvocation::Status).await.expect("status");
        assert_eq!(status.text, "new index.html");

        let committed = run(&ws, "commit", json!({"message": "add index"}))
            .await
            .expect("commit");
        assert!(committed.text.ends_with("add index"));

        let status = ws.execute(&ToolInvocation::Status).await.expect("status");
        assert_eq!(status.text, "working tree clean");

        let log = run(&ws, "log", json!({"limit": 5})).await.expect("log");
        assert!(log.text.contains("add index (dispatch-ai)"));

        let again = run(&ws, "commit", json!({"message": "empty"})).await;
        assert!(matches!(again, Err(Error::Tool(message)) if message == "nothing to commit"));
    }

    #[test]
    fn lookup_summary_prefers_abstract_and_related_topics() {
        let body = json!({
            "AbstractText": "Rust is a systems programming language.",
            "AbstractURL": "https://example.org/rust",
            "RelatedTopics": [{"Text": "Cargo - package manager"}, {"Name": "group"}]
        });
        let summary = summarize_lookup(&body, "rust");
        assert_eq!(
            summary,
            "Rust is a systems programming language.\nSource: https://example.org/rust\n- Cargo - package manager"
        );

        assert_eq!(summarize_lookup(&json!({}), "nothing"), "no summary found for 'nothing'");
    }
}
