//! Markdown fence stripping for raw model responses.

/// Strip markdown code-fence wrapping from a raw response, leaving
/// executable source text.
///
/// The opening fence line is dropped whole, so an optional language tag
/// (` ```python `) goes with it; a trailing fence is dropped at its last
/// occurrence. The strip is applied to a fixpoint, which makes the
/// function idempotent for every input, nested fences included.
pub fn strip_code_fences(raw: &str) -> String {
    let mut current = raw.trim().to_string();
    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_once(s: &str) -> String {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix("```") {
        let mut body = match rest.split_once('\n') {
            Some((_fence_line, tail)) => tail,
            None => rest,
        };
        if let Some(idx) = body.rfind("```") {
            body = &body[..idx];
        }
        return body.trim().to_string();
    }
    s.to_string()
}
