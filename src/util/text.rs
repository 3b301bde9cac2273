use std::borrow::Cow;

/// Longest entity body we look at before giving up on a `&`.
/// `&CounterClockwiseContourIntegral;` is the longest HTML5 name (31 chars).
const MAX_ENTITY_LEN: usize = 32;

/// Decodes HTML character references in `s`.
///
/// Handles every HTML5 named reference (`&eacute;`, `&rarr;`, …), decimal
/// (`&#8217;`) and hexadecimal (`&#x2019;`) references. Named references
/// need their trailing `;`. Decoding is lenient: a `&` that does
/// not start a recognised reference is copied through unchanged, so the
/// function never fails. Numeric references to invalid code points decode
/// to U+FFFD.
///
/// Borrows when there is nothing to decode.
///
/// # Examples
///
/// ```
/// use gator::util::unescape_html;
///
/// assert_eq!(unescape_html("A &amp; B"), "A & B");
/// assert_eq!(unescape_html("it&#8217;s"), "it\u{2019}s");
/// assert_eq!(unescape_html("Caf&eacute;"), "Café");
/// assert_eq!(unescape_html("AT&T"), "AT&T");
/// ```
pub fn unescape_html(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match decode_reference(tail, &mut out) {
            Some(consumed) => rest = &tail[consumed..],
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

/// Decodes the reference at the start of `tail` (which begins with `&`) into
/// `out`, returning the number of bytes consumed. `None` leaves `out` untouched.
fn decode_reference(tail: &str, out: &mut String) -> Option<usize> {
    let body_end = tail[1..]
        .char_indices()
        .take(MAX_ENTITY_LEN)
        .find(|&(_, c)| c == ';')
        .map(|(i, _)| i + 1)?;
    let body = &tail[1..body_end];
    if body.is_empty() {
        return None;
    }

    if let Some(numeric) = body.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) if is_all(hex, |c| c.is_ascii_hexdigit()) => {
                u32::from_str_radix(hex, 16).ok()?
            }
            None if is_all(numeric, |c| c.is_ascii_digit()) => numeric.parse::<u32>().ok()?,
            _ => return None,
        };
        let ch = match code {
            0 => char::REPLACEMENT_CHARACTER,
            c => char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER),
        };
        out.push(ch);
    } else {
        if !is_all(body, |c| c.is_ascii_alphanumeric()) {
            return None;
        }
        // The HTML5 table maps each name to one or two code points. Anything
        // else means only a prefix of `body` matched a legacy entity.
        let reference = &tail[..=body_end];
        let decoded = html_escape::decode_html_entities(reference);
        if decoded == reference || decoded.chars().count() > 2 {
            return None;
        }
        out.push_str(&decoded);
    }

    // +1 for the trailing ';'
    Some(body_end + 1)
}

fn is_all(s: &str, pred: impl Fn(char) -> bool) -> bool {
    !s.is_empty() && s.chars().all(pred)
}

/// Collapses runs of whitespace into single spaces and trims the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
