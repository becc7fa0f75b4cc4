use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment<'a> {
    pub text: &'a str,
    pub highlighted: bool,
}

/// Splits a text into alternating plain and highlighted fragments.
///
/// With `n` spans this yields `2n + 1` fragments, starting and ending with a
/// plain one (either may be empty). Concatenated, they give back the text.
/// Spans must be ordered, non-overlapping and on char boundaries, as
/// produced by `Regex::find_iter`.
pub struct Fragments<'a> {
    text: &'a str,
    spans: &'a [Range<usize>],
    pos: usize,
    next_span: usize,
    in_match: bool,
    done: bool,
}

impl<'a> Fragments<'a> {
    pub fn new(text: &'a str, spans: &'a [Range<usize>]) -> Self {
        Self {
            text,
            spans,
            pos: 0,
            next_span: 0,
            in_match: false,
            done: false,
        }
    }
}

impl<'a> Iterator for Fragments<'a> {
    type Item = Fragment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let text = self.text;
        if self.in_match {
            let span = self.spans[self.next_span].clone();
            self.next_span += 1;
            self.pos = span.end;
            self.in_match = false;
            return Some(Fragment {
                text: &text[span],
                highlighted: true,
            });
        }

        let end = match self.spans.get(self.next_span) {
            Some(span) => {
                self.in_match = true;
                span.start
            }
            None => {
                self.done = true;
                text.len()
            }
        };

        Some(Fragment {
            text: &text[self.pos..end],
            highlighted: false,
        })
    }
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(text: &str, mut idx: usize) -> usize {
    while !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

fn squash(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").into_owned()
}

/// One-line excerpts around the first `max` spans, the match wrapped in
/// brackets and `context` bytes kept on either side.
pub fn excerpts(text: &str, spans: &[Range<usize>], max: usize, context: usize) -> Vec<String> {
    spans
        .iter()
        .take(max)
        .map(|span| {
            let start = floor_char_boundary(text, span.start.saturating_sub(context));
            let end = ceil_char_boundary(text, (span.end + context).min(text.len()));

            format!(
                "{}[{}]{}",
                squash(&text[start..span.start]).trim_start(),
                squash(&text[span.clone()]),
                squash(&text[span.end..end]).trim_end(),
            )
        })
        .collect()
}
