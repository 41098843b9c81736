//! Response-directive parsing.
//!
//! The completion service embeds media references as standalone lines of the
//! form `[MEDIA: <ref>]`, optionally followed by one caption line. Everything
//! else is user-visible prose, kept in its original order.

/// One media-reference directive lifted out of completion output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub reference: String,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    /// Non-directive, non-empty lines, order preserved.
    pub prose: String,
    pub directives: Vec<Directive>,
}

/// Scan completion output for `[MEDIA: <ref>]` directives.
///
/// The line immediately after a directive, when non-empty and not itself a
/// directive, is consumed as that directive's caption. A reference repeated
/// within one response is kept once (first occurrence wins).
pub fn parse_response(raw: &str) -> ParsedResponse {
    let lines: Vec<&str> = raw.lines().collect();
    let mut prose: Vec<&str> = Vec::new();
    let mut directives: Vec<Directive> = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if let Some(reference) = directive_ref(line) {
            let mut caption = None;
            if let Some(next) = lines.get(i + 1) {
                if !next.trim().is_empty() && directive_ref(next).is_none() {
                    caption = Some(next.trim().to_string());
                    i += 1; // caption line consumed
                }
            }
            // Duplicate reference within one response: second occurrence
            // ignored (its caption line is still consumed).
            if !directives.iter().any(|d| d.reference == reference) {
                directives.push(Directive {
                    reference: reference.to_string(),
                    caption,
                });
            }
        } else if !line.trim().is_empty() {
            prose.push(line);
        }
        i += 1;
    }

    ParsedResponse {
        prose: prose.join("\n"),
        directives,
    }
}

/// Return the reference when `line` is a directive, `None` otherwise.
fn directive_ref(line: &str) -> Option<&str> {
    let inner = line.trim().strip_prefix("[MEDIA:")?.strip_suffix(']')?;
    let inner = inner.trim();
    (!inner.is_empty()).then_some(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_with_caption_between_prose() {
        let parsed = parse_response("hello\n[MEDIA: 3]\ncaption here\nworld");
        assert_eq!(parsed.prose, "hello\nworld");
        assert_eq!(
            parsed.directives,
            vec![Directive {
                reference: "3".to_string(),
                caption: Some("caption here".to_string()),
            }]
        );
    }

    #[test]
    fn no_directive_passes_text_through() {
        let parsed = parse_response("just a plain\nmulti-line answer");
        assert_eq!(parsed.prose, "just a plain\nmulti-line answer");
        assert!(parsed.directives.is_empty());
    }

    #[test]
    fn directive_without_caption() {
        let parsed = parse_response("[MEDIA: 5]\n\nsee above");
        assert_eq!(parsed.prose, "see above");
        assert_eq!(parsed.directives[0].caption, None);
    }

    #[test]
    fn directive_at_end_of_response() {
        let parsed = parse_response("take a look\n[MEDIA: 2]");
        assert_eq!(parsed.prose, "take a look");
        assert_eq!(parsed.directives.len(), 1);
        assert_eq!(parsed.directives[0].caption, None);
    }

    #[test]
    fn consecutive_directives_have_no_captions() {
        let parsed = parse_response("[MEDIA: 1]\n[MEDIA: 2]\ndone");
        assert_eq!(parsed.directives.len(), 2);
        assert_eq!(parsed.directives[0].caption, None);
        // "done" is the caption of the second directive, not prose
        assert_eq!(parsed.directives[1].caption, Some("done".to_string()));
        assert_eq!(parsed.prose, "");
    }

    #[test]
    fn duplicate_reference_kept_once() {
        let parsed = parse_response("[MEDIA: 4]\nfirst caption\ntext\n[MEDIA: 4]\nsecond caption");
        assert_eq!(parsed.directives.len(), 1);
        assert_eq!(
            parsed.directives[0].caption,
            Some("first caption".to_string())
        );
        assert_eq!(parsed.prose, "text");
    }

    #[test]
    fn whitespace_tolerant_directive_matching() {
        let parsed = parse_response("  [MEDIA:   12 ]  ");
        assert_eq!(parsed.directives[0].reference, "12");
    }

    #[test]
    fn empty_reference_is_prose() {
        let parsed = parse_response("[MEDIA: ]");
        assert!(parsed.directives.is_empty());
        assert_eq!(parsed.prose, "[MEDIA: ]");
    }

    #[test]
    fn sent_marker_token_is_not_a_directive() {
        let parsed = parse_response("here you go\n[sent media #3]");
        assert!(parsed.directives.is_empty());
        assert_eq!(parsed.prose, "here you go\n[sent media #3]");
    }
}
