//! Sentence-boundary splitter (spec §4.10 "Sentence boundary"): feeds
//! LLM token deltas in, yields completed sentences as soon as a
//! terminator is unambiguous, and flushes whatever is left when the
//! stream closes without a trailing terminator.
//!
//! Boundaries are `. ! ? ; 。 ！ ？ ； ：` or a newline. Three
//! exceptions withhold a split: inside a fenced code block (a run
//! delimited by a pair of ` ``` ` markers), inside a URL token (any
//! run of non-whitespace containing `://`), and a `.` flanked by
//! digits on both sides (a decimal or a dotted date like `2026.08.01`).

const TERMINATORS: &[char] = &['.', '!', '?', ';', '。', '！', '？', '；', '：'];

pub struct SentenceSplitter {
    buffer: String,
}

impl SentenceSplitter {
    pub fn new() -> Self {
        Self { buffer: String::new() }
    }

    /// Appends streamed text, returning zero or more sentences that
    /// became unambiguous as a result.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);
        let mut sentences = Vec::new();
        while let Some(end) = self.find_boundary() {
            let sentence = self.buffer[..end].trim().to_string();
            self.buffer.drain(..end);
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
        }
        sentences
    }

    /// Drains and returns any trailing residue, called once the
    /// generation stream closes (spec: "final fragment is always
    /// flushed even without a terminator").
    pub fn flush(&mut self) -> Option<String> {
        let rest = self.buffer.trim().to_string();
        self.buffer.clear();
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    fn find_boundary(&self) -> Option<usize> {
        let chars: Vec<(usize, char)> = self.buffer.char_indices().collect();
        let mut fence_open = false;
        let mut i = 0;
        while i < chars.len() {
            let (byte_idx, ch) = chars[i];

            if ch == '`' && self.buffer[byte_idx..].starts_with("```") {
                fence_open = !fence_open;
                i += 3;
                continue;
            }
            if fence_open {
                i += 1;
                continue;
            }
            if ch == '\n' {
                return Some(byte_idx + ch.len_utf8());
            }
            if TERMINATORS.contains(&ch) {
                let line_start =
                    self.buffer[..byte_idx].rfind(char::is_whitespace).map(|p| p + 1).unwrap_or(0);
                let token_so_far = &self.buffer[line_start..byte_idx];
                if token_so_far.contains("://") {
                    i += 1;
                    continue;
                }
                if ch == '.' {
                    let prev_digit =
                        self.buffer[..byte_idx].chars().next_back().map(|c| c.is_ascii_digit()).unwrap_or(false);
                    let next = chars.get(i + 1).map(|(_, c)| *c);
                    if prev_digit && next.map(|c| c.is_ascii_digit()).unwrap_or(false) {
                        i += 1;
                        continue;
                    }
                    // Not enough lookahead yet to rule out a decimal still
                    // streaming in (e.g. "3." before the "14" arrives).
                    if prev_digit && next.is_none() {
                        return None;
                    }
                }
                return Some(byte_idx + ch.len_utf8());
            }
            i += 1;
        }
        None
    }
}

impl Default for SentenceSplitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_three_sentences_across_several_pushes() {
        let mut splitter = SentenceSplitter::new();
        let mut out = Vec::new();
        out.extend(splitter.push("第一句。第"));
        out.extend(splitter.push("二句！第三句"));
        out.extend(splitter.push("？"));
        assert_eq!(out, vec!["第一句。", "第二句！", "第三句？"]);
    }

    #[test]
    fn flush_returns_trailing_fragment_without_terminator() {
        let mut splitter = SentenceSplitter::new();
        assert!(splitter.push("no terminator yet").is_empty());
        assert_eq!(splitter.flush(), Some("no terminator yet".to_string()));
        assert_eq!(splitter.flush(), None);
    }

    #[test]
    fn does_not_split_a_decimal_number() {
        let mut splitter = SentenceSplitter::new();
        assert!(splitter.push("pi is about 3.14 today").is_empty());
        assert_eq!(splitter.flush(), Some("pi is about 3.14 today".to_string()));
    }

    #[test]
    fn does_not_split_a_url() {
        let mut splitter = SentenceSplitter::new();
        let out = splitter.push("see https://example.com/a.b.c for more. thanks");
        assert_eq!(out, vec!["see https://example.com/a.b.c for more."]);
    }

    #[test]
    fn does_not_split_inside_a_fenced_code_block() {
        let mut splitter = SentenceSplitter::new();
        let out = splitter.push("here: ```a. b. c``` done.");
        assert_eq!(out, vec!["here: ```a. b. c``` done."]);
    }

    #[test]
    fn newline_is_always_a_boundary() {
        let mut splitter = SentenceSplitter::new();
        let out = splitter.push("line one\nline two");
        assert_eq!(out, vec!["line one"]);
    }

    #[test]
    fn withholds_trailing_decimal_point_until_more_arrives() {
        let mut splitter = SentenceSplitter::new();
        // "3." at the very end of the buffer: ambiguous, must wait.
        assert!(splitter.push("the value is 3").is_empty());
        assert!(splitter.push(".").is_empty());
        let out = splitter.push("14 exactly. next");
        assert_eq!(out, vec!["the value is 3.14 exactly."]);
    }
}
