use std::mem;

/// Splits a sequence of byte chunks into complete lines.
///
/// Chunks may end anywhere, including in the middle of a line or of a
/// multi-byte character. The incomplete tail is held back until a later
/// chunk completes it, so the lines produced only depend on the
/// concatenated bytes, never on where the chunks were cut.
///
/// Lines are terminated by `\n`, an optional `\r` before it is dropped.
/// Empty lines carry nothing and are skipped. Invalid UTF-8 is replaced
/// with U+FFFD.
#[derive(Debug, Default)]
pub struct LineDecoder {
    // Decoded text after the last line break.
    pending: String,
    // Leading bytes of a character whose remaining bytes have not
    // arrived yet.
    partial_char: Vec<u8>,
}

impl LineDecoder {
    /// Creates an empty decoder.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the lines it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode(chunk);

        let Some(eol_idx) = self.pending.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(eol_idx + 1);
        let complete = mem::replace(&mut self.pending, rest);
        complete.split('\n').filter_map(clean_line).collect()
    }

    /// Flushes what is left after the last line break.
    ///
    /// Call this once the stream has ended. The decoder is empty
    /// afterwards.
    pub fn finish(&mut self) -> Option<String> {
        if !self.partial_char.is_empty() {
            let bytes = mem::take(&mut self.partial_char);
            self.pending.push_str(&String::from_utf8_lossy(&bytes));
        }
        clean_line(&mem::take(&mut self.pending))
    }

    fn decode(&mut self, chunk: &[u8]) {
        let joined;
        let mut input = if self.partial_char.is_empty() {
            chunk
        } else {
            self.partial_char.extend_from_slice(chunk);
            joined = mem::take(&mut self.partial_char);
            &joined[..]
        };

        loop {
            match str::from_utf8(input) {
                Ok(text) => {
                    self.pending.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    if let Ok(text) = str::from_utf8(valid) {
                        self.pending.push_str(text);
                    }
                    match err.error_len() {
                        Some(len) => {
                            self.pending.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        None => {
                            // Truncated character, wait for the rest.
                            self.partial_char.extend_from_slice(rest);
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn clean_line(line: &str) -> Option<String> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.is_empty() {
        None
    } else {
        Some(line.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> Vec<String> {
        let mut decoder = LineDecoder::new();
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(decoder.push(chunk));
        }
        lines.extend(decoder.finish());
        lines
    }

    #[test]
    fn test_complete_lines() {
        let lines = decode_all([&b"data: hello\n\ndata: bye\n\n"[..]]);
        assert_eq!(lines, ["data: hello", "data: bye"]);
    }

    #[test]
    fn test_holds_back_partial_line() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"data: {\"content\":").is_empty());
        assert_eq!(decoder.push(b"\"He\"}\ndata: [DO"), ["data: {\"content\":\"He\"}"]);
        assert_eq!(decoder.push(b"NE]\n"), ["data: [DONE]"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_flushes_tail_at_end() {
        let lines = decode_all([&b"data: a\ndata: [DONE]"[..]]);
        assert_eq!(lines, ["data: a", "data: [DONE]"]);
    }

    #[test]
    fn test_crlf() {
        let lines = decode_all([&b"data: a\r"[..], b"\n\r\ndata: b\r\n"]);
        assert_eq!(lines, ["data: a", "data: b"]);
    }

    #[test]
    fn test_split_multibyte_character() {
        let text = "data: {\"content\":\"héllo 🌍\"}\n";
        let bytes = text.as_bytes();
        let globe = text.find('🌍').unwrap();
        // Cut inside the four-byte emoji and inside the two-byte é.
        let e_acute = text.find('é').unwrap();
        let lines = decode_all([
            &bytes[..e_acute + 1],
            &bytes[e_acute + 1..globe + 2],
            &bytes[globe + 2..globe + 3],
            &bytes[globe + 3..],
        ]);
        assert_eq!(lines, ["data: {\"content\":\"héllo 🌍\"}"]);
    }

    #[test]
    fn test_invalid_bytes_are_replaced() {
        let lines = decode_all([&b"a\xffb\n"[..], b"c\xe2\x82", b"d\n"]);
        assert_eq!(lines, ["a\u{fffd}b", "c\u{fffd}d"]);

        // A truncated character at the very end is flushed lossily.
        let lines = decode_all([&b"tail \xf0\x9f"[..]]);
        assert_eq!(lines, ["tail \u{fffd}"]);
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let text = "data: {\"content\":\"Hé\"}\r\n\r\ndata: {not json}\n\n\
                    data: {\"content\":\"ļļo 🌍\"}\ndata: [DONE]\n";
        let bytes = text.as_bytes();
        let expected = decode_all([bytes]);
        assert_eq!(expected.len(), 4);

        for i in 0..=bytes.len() {
            for j in i..=bytes.len() {
                let lines = decode_all([&bytes[..i], &bytes[i..j], &bytes[j..]]);
                assert_eq!(lines, expected, "split at {i} and {j}");
            }
        }

        let bytewise = decode_all(bytes.chunks(1));
        assert_eq!(bytewise, expected);
    }

    #[test]
    fn test_many_split_points() {
        let text = ": keep-alive\r\ndata: {\"content\":\"<think>é\\n🌍\"}\r\n\r\n\
                    data: {\"content\":\"x</think>ok\"}\n\ndata: {oops\n\ndata: [DONE]";
        let bytes = text.as_bytes();
        let expected = decode_all([bytes]);
        assert_eq!(expected.len(), 5);

        // Deterministic pseudo-random cut points.
        let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut next = |bound: usize| {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (seed >> 33) as usize % (bound + 1)
        };
        for _ in 0..2_000 {
            let mut cuts: Vec<usize> = (0..5).map(|_| next(bytes.len())).collect();
            cuts.sort_unstable();
            let mut chunks = Vec::with_capacity(6);
            let mut start = 0;
            for cut in cuts {
                chunks.push(&bytes[start..cut]);
                start = cut;
            }
            chunks.push(&bytes[start..]);
            assert_eq!(decode_all(chunks), expected);
        }
    }
}
