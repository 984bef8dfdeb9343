use std::io::Write;

use crate::{error::Result, glance::ScoredWindow};

/// Write the top `top` windows for a terminal reader.
pub fn write_human<W: Write>(
    out: &mut W,
    windows: &[ScoredWindow],
    top: usize,
) -> Result<()> {
    for w in windows.iter().take(top) {
        writeln!(
            out,
            "Content (lines {}-{}, score {:.5}):",
            w.start_line, w.end_line, w.score
        )?;
        writeln!(out, "```")?;
        writeln!(out, "{}", w.content)?;
        writeln!(out, "```")?;
        writeln!(out)?;
    }
    Ok(())
}

/// Write every window as a JSON array, highest score first.
pub fn write_json<W: Write>(out: &mut W, windows: &[ScoredWindow]) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, windows)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<ScoredWindow> {
        vec![
            ScoredWindow {
                content: "fn main() {\n}".into(),
                start_line: 3,
                end_line: 5,
                score: 0.123456,
            },
            ScoredWindow {
                content: "use std::io;".into(),
                start_line: 0,
                end_line: 1,
                score: 0.05,
            },
        ]
    }

    #[test]
    fn human_format_has_five_decimals() {
        let mut buf = Vec::new();
        write_human(&mut buf, &sample(), 5).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert_eq!(
            text,
            "Content (lines 3-5, score 0.12346):\n```\nfn main() {\n}\n```\n\n\
             Content (lines 0-1, score 0.05000):\n```\nuse std::io;\n```\n\n"
        );
    }

    #[test]
    fn human_format_respects_top() {
        let mut buf = Vec::new();
        write_human(&mut buf, &sample(), 1).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.matches("Content (lines").count(), 1);
    }

    #[test]
    fn json_format_keeps_all_windows() {
        let mut buf = Vec::new();
        write_json(&mut buf, &sample()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["startLine"], 3);
        assert_eq!(items[1]["content"], "use std::io;");
    }
}
