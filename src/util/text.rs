use std::borrow::Cow;

/// SEC-001: Strip control characters and ANSI escape sequences from feed text.
///
/// Feed XML and JSON are attacker-controlled; titles and summaries end up in
/// logs, terminals and HTML views. This runs before HTML sanitization.
///
/// Strips:
/// - C0 controls except tab, newline and carriage return, plus DEL
/// - C1 controls (`U+0080..=U+009F`)
/// - bidi embedding, override and isolate characters
/// - CSI sequences (`ESC [` ... final byte `0x40..=0x7E`)
/// - OSC sequences (`ESC ]` ... terminated by BEL or `ESC \`)
/// - any other bare ESC
///
/// Returns `Cow::Borrowed` when nothing needs removing.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped_char) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.peek() {
                Some('[') => {
                    chars.next();
                    // Parameter and intermediate bytes run until the final byte.
                    for c in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&c) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '\x07' {
                            break;
                        }
                        if c == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            },
            c if is_stripped_char(c) => {}
            c => out.push(c),
        }
    }

    Cow::Owned(out)
}

fn is_stripped_char(c: char) -> bool {
    match c {
        '\t' | '\n' | '\r' => false,
        '\0'..='\x1f' | '\x7f'..='\u{9f}' => true,
        '\u{202a}'..='\u{202e}' | '\u{2066}'..='\u{2069}' => true,
        _ => false,
    }
}
