//! Balanced completion of truncated JSON.
//!
//! Structured streaming delivers the serialized object as a sequence of text
//! fragments. [`complete`] turns the prefix seen so far into the largest
//! parseable JSON value: unterminated strings are closed, open containers are
//! balanced, and trailing tokens that cannot yet contribute (a dangling key,
//! a half-written `true`, an unfinished escape) are dropped.

/// State of one open container on the scan stack.
#[derive(Clone, Copy)]
struct Ctx {
    is_object: bool,
    expect_key: bool,
}

/// Try to interpret `src` (a prefix of a JSON document) as a complete value.
///
/// Returns `None` when no prefix of the input forms a value yet (e.g. the
/// buffer is empty, whitespace, or holds only a half-written literal).
pub(crate) fn complete(src: &str) -> Option<serde_json::Value> {
    if src.trim().is_empty() {
        return None;
    }
    // Fast path: the buffer is already a full document.
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(src) {
        return Some(value);
    }

    let mut stack: Vec<Ctx> = Vec::new();
    // Byte index up to which the input, plus closers, forms valid JSON.
    let mut last_safe: usize = 0;
    let mut closers_at_safe = String::new();

    let mut in_string = false;
    let mut string_is_key = false;
    let mut escape_start: Option<usize> = None;
    let mut pending_hex: u8 = 0;

    // Start of a primitive token (number / true / false / null) in flight.
    let mut token_start: Option<usize> = None;

    let closers = |stack: &[Ctx]| -> String {
        stack
            .iter()
            .rev()
            .map(|c| if c.is_object { '}' } else { ']' })
            .collect()
    };

    let mut chars = src.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if in_string {
            if escape_start.is_some() {
                if pending_hex > 0 {
                    if c.is_ascii_hexdigit() {
                        pending_hex -= 1;
                        if pending_hex == 0 {
                            escape_start = None;
                        }
                    } else {
                        // Malformed escape; treat the rest as unusable.
                        return fallback(src, &closers_at_safe, last_safe);
                    }
                } else if c == 'u' {
                    pending_hex = 4;
                } else {
                    escape_start = None;
                }
                continue;
            }
            match c {
                '\\' => escape_start = Some(i),
                '"' => {
                    in_string = false;
                    if !string_is_key {
                        last_safe = i + c.len_utf8();
                        closers_at_safe = closers(&stack);
                    }
                }
                _ => {}
            }
            continue;
        }

        // A primitive token ends at any structural character or whitespace.
        if token_start.is_some()
            && (c.is_whitespace() || matches!(c, ',' | '}' | ']' | ':'))
        {
            let start = token_start.take().unwrap_or(i);
            if serde_json::from_str::<serde_json::Value>(&src[start..i]).is_ok() {
                last_safe = i;
                closers_at_safe = closers(&stack);
            }
        }

        match c {
            '{' => {
                stack.push(Ctx {
                    is_object: true,
                    expect_key: true,
                });
                last_safe = i + 1;
                closers_at_safe = closers(&stack);
            }
            '[' => {
                stack.push(Ctx {
                    is_object: false,
                    expect_key: false,
                });
                last_safe = i + 1;
                closers_at_safe = closers(&stack);
            }
            '}' | ']' => {
                stack.pop();
                last_safe = i + 1;
                closers_at_safe = closers(&stack);
            }
            '"' => {
                in_string = true;
                string_is_key = stack.last().is_some_and(|c| c.is_object && c.expect_key);
            }
            ':' => {
                if let Some(top) = stack.last_mut() {
                    top.expect_key = false;
                }
            }
            ',' => {
                if let Some(top) = stack.last_mut()
                    && top.is_object
                {
                    top.expect_key = true;
                }
            }
            c if c.is_whitespace() => {}
            _ => {
                if token_start.is_none() {
                    token_start = Some(i);
                }
            }
        }
    }

    // End of input: decide what the tail contributes.
    let tail_closers = closers(&stack);
    let candidate = if in_string {
        if string_is_key {
            None
        } else {
            let keep = escape_start.unwrap_or(src.len());
            Some(format!("{}\"{}", &src[..keep], tail_closers))
        }
    } else if let Some(start) = token_start {
        // Trim the trailing token until it parses on its own ("3." -> "3").
        let mut end = src.len();
        loop {
            if end <= start {
                break None;
            }
            if serde_json::from_str::<serde_json::Value>(&src[start..end]).is_ok() {
                break Some(format!("{}{}", &src[..end], tail_closers));
            }
            end -= 1;
            while end > start && !src.is_char_boundary(end) {
                end -= 1;
            }
        }
    } else {
        Some(format!("{}{}", &src[..], tail_closers))
    };

    if let Some(candidate) = candidate
        && let Ok(value) = serde_json::from_str::<serde_json::Value>(&candidate)
    {
        return Some(value);
    }
    fallback(src, &closers_at_safe, last_safe)
}

/// Cut back to the last safe point and balance what remains.
fn fallback(src: &str, closers_at_safe: &str, last_safe: usize) -> Option<serde_json::Value> {
    if last_safe == 0 {
        return None;
    }
    let candidate = format!("{}{}", &src[..last_safe], closers_at_safe);
    serde_json::from_str(&candidate).ok()
}
