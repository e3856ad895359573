//! Separating the model's reasoning from its answer.

use std::sync::LazyLock;

use regex::Regex;

static THINK_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>(.*?)</think>").expect("pattern is valid")
});

/// The parts of a finalized answer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Extracted {
    /// Trimmed text of the first `<think>` block, unless it was blank.
    pub thinking: Option<String>,
    /// The trimmed text with the first `<think>` block removed.
    pub result: String,
}

/// Splits raw model output into its reasoning and its answer.
///
/// Only the first `<think>…</think>` pair is taken out. Any later pair
/// stays in the result as plain text.
pub fn extract(raw: &str) -> Extracted {
    let found = THINK_BLOCK
        .captures(raw)
        .and_then(|caps| Some((caps.get(0)?, caps.get(1)?)));
    let Some((block, inner)) = found else {
        return Extracted {
            thinking: None,
            result: raw.trim().to_owned(),
        };
    };

    let thinking = inner.as_str().trim();
    let mut result = String::with_capacity(raw.len() - block.len());
    result.push_str(&raw[..block.start()]);
    result.push_str(&raw[block.end()..]);

    Extracted {
        thinking: (!thinking.is_empty()).then(|| thinking.to_owned()),
        result: result.trim().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(raw: &str) -> (Option<String>, String) {
        let Extracted { thinking, result } = extract(raw);
        (thinking, result)
    }

    #[test]
    fn test_with_thinking() {
        assert_eq!(
            split("<think>A</think>B"),
            (Some("A".to_owned()), "B".to_owned())
        );
        assert_eq!(
            split("<think>\nstep 1\nstep 2\n</think>\n\nThe answer is 4.\n"),
            (Some("step 1\nstep 2".to_owned()), "The answer is 4.".to_owned())
        );
        assert_eq!(
            split("Before <think>hmm</think> after"),
            (Some("hmm".to_owned()), "Before  after".to_owned())
        );
    }

    #[test]
    fn test_without_thinking() {
        assert_eq!(split("B"), (None, "B".to_owned()));
        assert_eq!(split("  padded \n"), (None, "padded".to_owned()));
        assert_eq!(split(""), (None, String::new()));
        // An unclosed block is not a block.
        assert_eq!(
            split("<think>never closed"),
            (None, "<think>never closed".to_owned())
        );
    }

    #[test]
    fn test_blank_thinking() {
        assert_eq!(
            split("<think>   </think>Answer"),
            (None, "Answer".to_owned())
        );
        assert_eq!(split("<think></think>"), (None, String::new()));
    }

    #[test]
    fn test_only_first_block_is_removed() {
        assert_eq!(
            split("<think>one</think>mid<think>two</think>end"),
            (Some("one".to_owned()), "mid<think>two</think>end".to_owned())
        );
    }
}
