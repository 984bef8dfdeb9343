//! Overlapping line windows over a file.
//!
//! Every alignment of a `window_size`-line window is generated, including the
//! partial windows that hang off either end of the file, so the first and last
//! lines get the same amount of context as the middle of the file.

/// A contiguous `[start_line, end_line)` range of a file, 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    /// Lines of the range joined with `\n`, trailing whitespace removed.
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// Split `lines` into overlapping windows of at most `window_size` lines.
///
/// For every offset `i` in `-(window_size - 1)..len`, the window covers
/// `max(0, i)..min(len, i + window_size)`. Windows whose trimmed content is
/// empty are skipped, and a range identical to the previously emitted one
/// (which happens once both ends are clamped, in files shorter than the
/// window) is emitted only once.
///
/// # Examples
///
/// ```
/// use glance::window::line_windows;
///
/// let windows = line_windows(&["fn main() {", "}"], 2);
/// let ranges: Vec<_> =
///     windows.iter().map(|w| (w.start_line, w.end_line)).collect();
/// assert_eq!(ranges, vec![(0, 1), (0, 2), (1, 2)]);
/// ```
pub fn line_windows<S: AsRef<str>>(
    lines: &[S],
    window_size: usize,
) -> Vec<Window> {
    if window_size == 0 || lines.is_empty() {
        return Vec::new();
    }

    // Offsets past a full-file window only repeat the clamped range.
    let len = lines.len() as isize;
    let size = window_size.min(lines.len()) as isize;
    let mut windows: Vec<Window> = Vec::new();

    for i in (1 - size)..len {
        let start_line = i.max(0) as usize;
        let end_line = (i + size).min(len) as usize;

        if windows.last().is_some_and(|prev| {
            prev.start_line == start_line && prev.end_line == end_line
        }) {
            continue;
        }

        let content = join_lines(&lines[start_line..end_line]);
        if content.is_empty() {
            continue;
        }

        windows.push(Window {
            content,
            start_line,
            end_line,
        });
    }

    windows
}

fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let mut joined = lines
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n");
    let trimmed = joined.trim_end().len();
    joined.truncate(trimmed);
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triples(windows: &[Window]) -> Vec<(usize, usize, &str)> {
        windows
            .iter()
            .map(|w| (w.start_line, w.end_line, w.content.as_str()))
            .collect()
    }

    #[test]
    fn blank_line_inside_windows() {
        let windows = line_windows(&["a", "b", "", "c"], 2);
        assert_eq!(
            triples(&windows),
            vec![
                (0, 1, "a"),
                (0, 2, "a\nb"),
                (1, 3, "b"),
                (2, 4, "\nc"),
                (3, 4, "c"),
            ]
        );
    }

    #[test]
    fn whitespace_only_windows_are_skipped() {
        let windows = line_windows(&["a", "  ", "\t", "b"], 1);
        assert_eq!(triples(&windows), vec![(0, 1, "a"), (3, 4, "b")]);
    }

    #[test]
    fn trailing_whitespace_is_trimmed() {
        let windows = line_windows(&["let x = 1;   ", "  "], 2);
        assert_eq!(windows[0].content, "let x = 1;");
        assert!(windows.iter().all(|w| w.content == "let x = 1;"));
    }

    #[test]
    fn single_line_file_yields_one_window() {
        let windows = line_windows(&["only"], 5);
        assert_eq!(triples(&windows), vec![(0, 1, "only")]);
    }

    #[test]
    fn short_file_never_has_full_window() {
        let lines = ["a", "b", "c"];
        let windows = line_windows(&lines, 10);
        assert!(windows.iter().all(|w| w.end_line - w.start_line <= 3));
        assert_eq!(
            windows
                .iter()
                .map(|w| (w.start_line, w.end_line))
                .collect::<Vec<_>>(),
            vec![(0, 1), (0, 2), (0, 3), (1, 3), (2, 3)]
        );
    }

    #[test]
    fn leading_windows_grow_to_full_size() {
        let lines: Vec<String> = (0..10).map(|i| format!("line {i}")).collect();
        let windows = line_windows(&lines, 4);

        // 3 leading partial windows, then one per line.
        assert_eq!(windows.len(), 3 + 10);
        for (k, w) in windows.iter().take(4).enumerate() {
            assert_eq!(w.start_line, 0);
            assert_eq!(w.end_line, k + 1);
        }
        let last = windows.last().unwrap();
        assert_eq!((last.start_line, last.end_line), (9, 10));
    }

    #[test]
    fn ranges_match_clamped_sweep() {
        let lines: Vec<String> = (0..7).map(|i| format!("x{i}")).collect();
        for size in 1..9 {
            let windows = line_windows(&lines, size);
            let mut expected = Vec::new();
            for i in (1 - size as isize)..7 {
                let range =
                    (i.max(0) as usize, (i + size as isize).min(7) as usize);
                if expected.last() != Some(&range) {
                    expected.push(range);
                }
            }
            let actual: Vec<_> =
                windows.iter().map(|w| (w.start_line, w.end_line)).collect();
            assert_eq!(actual, expected, "window size {size}");
            assert!(
                windows.iter().all(|w| w.start_line < w.end_line
                    && w.end_line <= lines.len())
            );
        }
    }

    #[test]
    fn huge_window_size_matches_file_length() {
        let lines = ["a", "b", "c"];
        let expected = line_windows(&lines, 3);
        assert_eq!(line_windows(&lines, usize::MAX), expected);
        assert_eq!(line_windows(&lines, 200_000_000), expected);
        assert_eq!(
            expected
                .iter()
                .map(|w| (w.start_line, w.end_line))
                .collect::<Vec<_>>(),
            vec![(0, 1), (0, 2), (0, 3), (1, 3), (2, 3)]
        );
    }

    #[test]
    fn start_lines_never_decrease() {
        let lines = ["a", "", "b", "c", "", "", "d"];
        let windows = line_windows(&lines, 3);
        assert!(
            windows
                .windows(2)
                .all(|pair| pair[0].start_line <= pair[1].start_line)
        );
    }

    #[test]
    fn zero_window_size_or_no_lines() {
        assert!(line_windows(&["a"], 0).is_empty());
        assert!(line_windows::<&str>(&[], 3).is_empty());
    }
}
