const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// Longer than the longest tag (`</think>` is 9 bytes) so a `push` can never
/// emit text that might still turn out to be part of the closing tag.
const DANGER_ZONE: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BeforeOpen,
    InThink,
    Done,
}

/// Byte-level `<think>…</think>` splitter. Feed it token fragments of any
/// size (including ones that split a tag or a UTF-8 character across two
/// calls) via `push`; it yields only text that is provably inside the
/// think block. Everything after the closing tag is buffered silently and
/// retrieved once via `finish`.
pub struct ThinkingStreamParser {
    buffer: String,
    state: State,
    post_close: String,
}

impl Default for ThinkingStreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkingStreamParser {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            state: State::BeforeOpen,
            post_close: String::new(),
        }
    }

    /// Feeds one chunk of the token stream; returns newly safe-to-display
    /// `<think>` content, if any.
    pub fn push(&mut self, chunk: &str) -> String {
        self.buffer.push_str(chunk);
        let mut emitted = String::new();

        loop {
            match self.state {
                State::BeforeOpen => {
                    if let Some(idx) = self.buffer.find(OPEN_TAG) {
                        self.buffer.drain(..idx + OPEN_TAG.len());
                        self.state = State::InThink;
                        continue;
                    }
                    // No opening tag yet; keep only a tail that could still
                    // grow into one, discard the rest (it precedes the
                    // think block and is never emitted).
                    let keep_from = floor_char_boundary(&self.buffer, self.buffer.len().saturating_sub(OPEN_TAG.len() - 1));
                    if keep_from > 0 {
                        self.buffer.drain(..keep_from);
                    }
                    break;
                }
                State::InThink => {
                    if let Some(idx) = self.buffer.find(CLOSE_TAG) {
                        emitted.push_str(&self.buffer[..idx]);
                        let rest = self.buffer[idx + CLOSE_TAG.len()..].to_owned();
                        self.post_close.push_str(&rest);
                        self.buffer.clear();
                        self.state = State::Done;
                        continue;
                    }
                    if self.buffer.len() > DANGER_ZONE {
                        let cut = floor_char_boundary(&self.buffer, self.buffer.len() - DANGER_ZONE);
                        emitted.push_str(&self.buffer[..cut]);
                        self.buffer.drain(..cut);
                    }
                    break;
                }
                State::Done => {
                    self.post_close.push_str(&self.buffer);
                    self.buffer.clear();
                    break;
                }
            }
        }

        emitted
    }

    /// Call once the token stream has ended. Flushes any remaining
    /// `<think>` content (covers a stream that never closed the tag) and
    /// returns the accumulated post-`</think>` payload for JSON parsing.
    pub fn finish(mut self) -> (String, String) {
        let mut tail = String::new();
        if self.state == State::InThink {
            tail.push_str(&self.buffer);
            self.buffer.clear();
        }
        (tail, self.post_close)
    }
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(chunks: &[&str]) -> (String, String) {
        let mut parser = ThinkingStreamParser::new();
        let mut out = String::new();
        for chunk in chunks {
            out.push_str(&parser.push(chunk));
        }
        let (tail, post) = parser.finish();
        out.push_str(&tail);
        (out, post)
    }

    #[test]
    fn splits_single_chunk() {
        let (think, post) = run(&["<think>reasoning here</think>{\"tool\":\"think\"}"]);
        assert_eq!(think, "reasoning here");
        assert_eq!(post, "{\"tool\":\"think\"}");
    }

    #[test]
    fn splits_across_arbitrary_chunk_boundaries() {
        let whole = "<think>step by step analysis</think>{\"tool\":\"complete\"}";
        for split in 1..whole.len() {
            if !whole.is_char_boundary(split) {
                continue;
            }
            let (a, b) = whole.split_at(split);
            let (think, post) = run(&[a, b]);
            assert_eq!(think, "step by step analysis", "split at {split}");
            assert_eq!(post, "{\"tool\":\"complete\"}", "split at {split}");
        }
    }

    #[test]
    fn close_tag_split_byte_by_byte_never_leaks() {
        let whole = "<think>x</think>Y";
        let mut parser = ThinkingStreamParser::new();
        let mut out = String::new();
        for byte_chunk in whole.as_bytes().chunks(1) {
            out.push_str(&parser.push(std::str::from_utf8(byte_chunk).unwrap()));
        }
        let (tail, post) = parser.finish();
        out.push_str(&tail);
        assert_eq!(out, "x");
        assert_eq!(post, "Y");
    }

    #[test]
    fn never_closed_think_flushes_on_finish() {
        let (think, post) = run(&["<think>unterminated"]);
        assert_eq!(think, "unterminated");
        assert_eq!(post, "");
    }
}
