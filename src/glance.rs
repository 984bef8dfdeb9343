use serde::Serialize;
use tracing::debug;

use crate::{
    embedding::Embedder,
    error::{Error, Result},
    rank::{self, RankParams},
    window::{Window, line_windows},
};

/// Default window size for the command line.
pub const DEFAULT_WINDOW_SIZE: usize = 5;

/// A window together with its importance score.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredWindow {
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub score: f32,
}

impl ScoredWindow {
    fn new(window: Window, score: f32) -> Self {
        Self {
            content: window.content,
            start_line: window.start_line,
            end_line: window.end_line,
            score,
        }
    }
}

/// Rank the line windows of `content` with the default PageRank settings.
///
/// Returns every window of `window_size` lines, highest score first.
pub fn glance<E: Embedder + ?Sized>(
    embedder: &E,
    content: &str,
    window_size: usize,
) -> Result<Vec<ScoredWindow>> {
    glance_with(embedder, content, window_size, RankParams::default())
}

/// Rank the line windows of `content`.
///
/// 1. Split `content` on `\n` into overlapping windows
/// 2. Embed the window texts, in window order
/// 3. PageRank over the similarity graph of the embeddings
/// 4. Sort by score descending; equal scores keep window order
pub fn glance_with<E: Embedder + ?Sized>(
    embedder: &E,
    content: &str,
    window_size: usize,
    params: RankParams,
) -> Result<Vec<ScoredWindow>> {
    if window_size == 0 {
        return Err(Error::InvalidInput("window size must be positive".into()));
    }

    let lines: Vec<&str> = content.split('\n').collect();
    let windows = line_windows(&lines, window_size);
    if windows.is_empty() {
        return Err(Error::InvalidInput("content has no non-blank lines".into()));
    }
    debug!(lines = lines.len(), windows = windows.len(), "generated windows");

    let texts: Vec<String> = windows.iter().map(|w| w.content.clone()).collect();
    let embeddings = embedder.embed(&texts)?;
    let rows = embeddings.dim(0)?;
    if rows != windows.len() {
        return Err(Error::Config(format!(
            "embedder returned {rows} rows for {} windows",
            windows.len()
        )));
    }

    let scores = rank::page_rank(&embeddings, params)?;

    let mut scored: Vec<ScoredWindow> = windows
        .into_iter()
        .zip(scores)
        .map(|(window, score)| ScoredWindow::new(window, score))
        .collect();

    sort_by_score(&mut scored);
    Ok(scored)
}

/// Highest score first. Stable, so ties keep generation order.
fn sort_by_score(windows: &mut [ScoredWindow]) {
    windows.sort_by(|a, b| b.score.total_cmp(&a.score));
}
