//! Resolving a file reference to its text.
//!
//! References are either local paths or Sourcegraph blob URLs of the form
//! `https://sourcegraph.com/<repo>[@<rev>]/-/blob/<path>`. Sourcegraph files
//! are fetched through the GraphQL API together with their HTML syntax
//! highlighting.

use std::{
    future::Future,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{Error, Result};

pub const SOURCEGRAPH_URL_PREFIX: &str = "https://sourcegraph.com/";
pub const SOURCEGRAPH_API_URL: &str = "https://sourcegraph.com/.api/graphql";
pub const TOKEN_ENV_VAR: &str = "SOURCEGRAPH_API_TOKEN";

const BLOB_SEPARATOR: &str = "/-/blob/";
const DEFAULT_REV: &str = "HEAD";
// Highlight the whole file.
const LAST_LINE: i64 = (1 << 31) - 1;

const HIGHLIGHTED_FILE_QUERY: &str = r#"
query HighlightedFile(
    $repoName: String!
    $commitID: String!
    $filePath: String!
    $startLine: Int!
    $endLine: Int!
) {
    repository(name: $repoName) {
        commit(rev: $commitID) {
            file(path: $filePath) {
                content
                highlight(disableTimeout: true, format: HTML_HIGHLIGHT) {
                    lineRanges(ranges: [{startLine: $startLine, endLine: $endLine}])
                }
            }
        }
    }
}
"#;

/// A file inside a Sourcegraph-hosted repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcegraphFile {
    pub repo: String,
    pub rev: String,
    pub path: String,
}

impl SourcegraphFile {
    /// Parse a Sourcegraph blob URL. Returns `None` for anything else.
    ///
    /// # Examples
    ///
    /// ```
    /// use glance::source::SourcegraphFile;
    ///
    /// let file = SourcegraphFile::parse_url(
    ///     "https://sourcegraph.com/github.com/rust-lang/rust@master/-/blob/README.md",
    /// )
    /// .unwrap();
    /// assert_eq!(file.repo, "github.com/rust-lang/rust");
    /// assert_eq!(file.rev, "master");
    /// assert_eq!(file.path, "README.md");
    /// ```
    pub fn parse_url(url: &str) -> Option<Self> {
        let rest = url.strip_prefix(SOURCEGRAPH_URL_PREFIX)?;
        let (repo_part, path) = rest.split_once(BLOB_SEPARATOR)?;

        let (repo, rev) = match repo_part.split_once('@') {
            Some((repo, rev)) if !rev.is_empty() => (repo, rev),
            Some((repo, _)) => (repo, DEFAULT_REV),
            None => (repo_part, DEFAULT_REV),
        };

        let path = path.split_once('?').map_or(path, |(path, _)| path);
        if repo.is_empty() || path.is_empty() {
            return None;
        }

        Some(Self {
            repo: repo.to_string(),
            rev: rev.to_string(),
            path: path.to_string(),
        })
    }
}

/// Where a file's content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    Local(PathBuf),
    Sourcegraph(SourcegraphFile),
}

impl FileRef {
    /// Sourcegraph blob URLs are remote references; anything else is a path.
    pub fn parse(reference: &str) -> Result<Self> {
        if reference.is_empty() {
            return Err(Error::InvalidInput("empty file reference".into()));
        }
        if reference.starts_with(SOURCEGRAPH_URL_PREFIX) {
            return SourcegraphFile::parse_url(reference)
                .map(FileRef::Sourcegraph)
                .ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "not a Sourcegraph blob URL: {reference}"
                    ))
                });
        }
        Ok(FileRef::Local(PathBuf::from(reference)))
    }
}

/// File text, plus syntax-highlighted HTML when the source provides it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContent {
    pub content: String,
    pub highlighted: Option<String>,
}

/// Fetches remote file content.
pub trait ContentSource: Send + Sync {
    fn resolve(
        &self,
        file: &SourcegraphFile,
    ) -> impl Future<Output = Result<ResolvedContent>> + Send;
}

/// Read a local UTF-8 file.
pub fn read_local(path: &Path) -> Result<ResolvedContent> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound {
                kind: "file",
                name: path.display().to_string(),
            }
        } else {
            Error::Io(e)
        }
    })?;

    Ok(ResolvedContent {
        content,
        highlighted: None,
    })
}

/// GraphQL client for sourcegraph.com.
#[derive(Debug, Clone)]
pub struct SourcegraphClient {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl Default for SourcegraphClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SourcegraphClient {
    /// Client for the public endpoint, authenticated with the
    /// `SOURCEGRAPH_API_TOKEN` environment variable when it is set.
    pub fn new() -> Self {
        let token = std::env::var(TOKEN_ENV_VAR).ok().filter(|t| !t.is_empty());
        Self::with_endpoint(SOURCEGRAPH_API_URL.to_string(), token)
    }

    pub fn with_endpoint(endpoint: String, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            token,
        }
    }

    async fn query(&self, file: &SourcegraphFile) -> Result<serde_json::Value> {
        let body = json!({
            "query": HIGHLIGHTED_FILE_QUERY,
            "variables": {
                "repoName": file.repo,
                "commitID": file.rev,
                "filePath": file.path,
                "startLine": 0,
                "endLine": LAST_LINE,
            },
        });

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("token {token}"));
        }

        debug!(repo = %file.repo, rev = %file.rev, path = %file.path, "querying sourcegraph");
        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

impl ContentSource for SourcegraphClient {
    async fn resolve(&self, file: &SourcegraphFile) -> Result<ResolvedContent> {
        let response = self.query(file).await?;
        parse_highlighted_file(response, file)
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<ResponseData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    commit: Option<Commit>,
}

#[derive(Debug, Deserialize)]
struct Commit {
    file: Option<BlobFile>,
}

#[derive(Debug, Deserialize)]
struct BlobFile {
    content: String,
    highlight: Option<Highlight>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Highlight {
    line_ranges: Vec<Vec<String>>,
}

/// Extract the file content and highlighted markup from a
/// `HighlightedFile` query response.
fn parse_highlighted_file(
    response: serde_json::Value,
    file: &SourcegraphFile,
) -> Result<ResolvedContent> {
    let response: GraphQlResponse = serde_json::from_value(response)?;
    if let Some(error) = response.errors.first() {
        return Err(Error::Source(error.message.clone()));
    }

    let not_found = |kind: &'static str, name: &str| Error::NotFound {
        kind,
        name: name.to_string(),
    };

    let repository = response
        .data
        .and_then(|d| d.repository)
        .ok_or_else(|| not_found("repository", &file.repo))?;
    let commit = repository
        .commit
        .ok_or_else(|| not_found("revision", &file.rev))?;
    let blob = commit.file.ok_or_else(|| not_found("file", &file.path))?;

    let highlighted = blob
        .highlight
        .and_then(|h| h.line_ranges.into_iter().next())
        .map(|lines| lines.join("\n"));

    Ok(ResolvedContent {
        content: blob.content,
        highlighted,
    })
}
