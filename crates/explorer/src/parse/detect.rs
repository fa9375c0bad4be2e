//! Framing detection: JSON-Lines vs pretty-printed JSON, plus the
//! unindented-brace splitter for concatenated pretty-printed objects.

/// How a file's content is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// One envelope per line.
    Jsonl,
    /// A single pretty-printed object, an array of envelopes, or several
    /// concatenated pretty-printed objects.
    PrettyJson,
}

/// Decide the framing from the first non-blank line.
///
/// A line that is exactly `{` or `[` means a pretty-printed export; anything
/// else (including a compact single-line object) is treated as JSON-Lines.
pub fn detect_format(content: &str) -> InputFormat {
    let first_line = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty());
    match first_line {
        Some("{") | Some("[") => InputFormat::PrettyJson,
        _ => InputFormat::Jsonl,
    }
}

/// Split concatenated pretty-printed JSON into candidate top-level blocks.
///
/// Block boundaries are lines that are exactly `{` (open) and exactly `}`
/// (close) with no indentation; nested braces are assumed indented and are
/// never boundaries. The heuristic matches a specific exporter's formatting
/// and is deliberately not generalized.
pub fn split_top_level_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in content.lines() {
        match (line, &mut current) {
            ("{", None) => current = Some(vec![line]),
            ("}", Some(lines)) => {
                lines.push(line);
                blocks.push(lines.join("\n"));
                current = None;
            }
            (_, Some(lines)) => lines.push(line),
            (_, None) => {} // Text between blocks is ignored.
        }
    }

    blocks
}
