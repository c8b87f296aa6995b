//! Splitting outbound text into wire-sized batches.

/// Bytes of text sent per PRIVMSG/NOTICE line.
///
/// Leaves room for the source, command, target and CRLF inside a 512 byte
/// line.
pub const MESSAGE_CHUNK_SIZE: usize = 400;

/// Split `text` into pieces of at most `max` bytes.
///
/// Embedded newlines always start a new piece. Within a line the split
/// prefers the last space before the limit and never cuts a UTF-8
/// sequence. Empty lines are dropped since IRC cannot carry them.
pub fn chunk_text(text: &str, max: usize) -> Vec<String> {
    let max = max.max(4);
    let mut out = Vec::new();

    for line in text.split('\n') {
        let mut rest = line.trim_end_matches('\r');
        while rest.len() > max {
            let mut cut = max;
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            if let Some(space) = rest[..cut].rfind(' ').filter(|&i| i > 0) {
                cut = space;
            }
            out.push(rest[..cut].to_owned());
            rest = rest[cut..].trim_start_matches(' ');
        }
        if !rest.is_empty() {
            out.push(rest.to_owned());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        assert_eq!(chunk_text("hello", 400), vec!["hello"]);
    }

    #[test]
    fn newlines_split_and_blank_lines_vanish() {
        assert_eq!(chunk_text("a\r\n\nb", 400), vec!["a", "b"]);
    }

    #[test]
    fn prefers_word_boundary() {
        assert_eq!(
            chunk_text("alpha beta gamma", 11),
            vec!["alpha beta", "gamma"]
        );
    }

    #[test]
    fn hard_cut_respects_char_boundaries() {
        let text = "é".repeat(10);
        let chunks = chunk_text(&text, 5);
        assert!(chunks.iter().all(|c| c.len() <= 5));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn every_chunk_fits() {
        let text = "word ".repeat(300);
        for chunk in chunk_text(&text, MESSAGE_CHUNK_SIZE) {
            assert!(chunk.len() <= MESSAGE_CHUNK_SIZE);
        }
    }
}
