//! Line-based chunking for the recall index.

/// Approximate characters per token.
pub const CHARS_PER_TOKEN: usize = 4;
pub const CHUNK_TOKENS: usize = 400;
pub const OVERLAP_TOKENS: usize = 80;

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    /// 1-based line of the chunk's first line in its source file.
    pub start_line: usize,
}

/// Split `content` into overlapping chunks of roughly [`CHUNK_TOKENS`].
/// Lines are never split; a line longer than the target becomes its own chunk.
pub fn chunk_text(content: &str) -> Vec<Chunk> {
    chunk_with(content, CHUNK_TOKENS * CHARS_PER_TOKEN, OVERLAP_TOKENS * CHARS_PER_TOKEN)
}

fn chunk_with(content: &str, max_chars: usize, overlap_chars: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current: Vec<(usize, &str)> = Vec::new();
    let mut current_chars = 0usize;

    for (idx, line) in content.lines().enumerate() {
        let line_chars = line.chars().count() + 1;
        if current_chars + line_chars > max_chars && !current.is_empty() {
            flush(&current, &mut chunks);

            // Carry a tail forward, always dropping at least the first line.
            let mut kept = 0;
            let mut kept_chars = 0;
            for (_, l) in current.iter().rev() {
                let n = l.chars().count() + 1;
                if kept_chars + n > overlap_chars || kept + 1 >= current.len() {
                    break;
                }
                kept_chars += n;
                kept += 1;
            }
            current.drain(..current.len() - kept);
            current_chars = kept_chars;
        }
        current.push((idx + 1, line));
        current_chars += line_chars;
    }
    flush(&current, &mut chunks);
    chunks
}

fn flush(lines: &[(usize, &str)], out: &mut Vec<Chunk>) {
    let Some(&(start_line, _)) = lines.first() else {
        return;
    };
    let text = lines.iter().map(|(_, l)| *l).collect::<Vec<_>>().join("\n");
    if text.trim().is_empty() {
        return;
    }
    out.push(Chunk { text, start_line });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_one_chunk() {
        let chunks = chunk_text("# 2026-10-16\n\n- bought milk");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 1);
        assert!(chunks[0].text.ends_with("bought milk"));
    }

    #[test]
    fn long_content_overlaps_by_tail_lines() {
        let content: String = (1..=10).map(|i| format!("line{i:02}\n")).collect();
        // Each line is 6 chars (+1); 3 lines per chunk, one line of overlap.
        let chunks = chunk_with(&content, 24, 8);
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].text, "line01\nline02\nline03");
        assert_eq!(chunks[1].start_line, 3);
        assert!(chunks[1].text.starts_with("line03"));
        assert!(chunks.last().unwrap().text.ends_with("line10"));
    }

    #[test]
    fn oversized_line_still_makes_progress() {
        let long = "x".repeat(50);
        let content = format!("{long}\n{long}\n{long}");
        let chunks = chunk_with(&content, 20, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks.iter().map(|c| c.start_line).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn blank_content_yields_nothing() {
        assert!(chunk_text("\n\n   \n").is_empty());
    }
}
