use std::iter::Peekable;
use std::str::Chars;

use tracing::*;

/// Unescapes the body of a javascript string literal delimited by `quote`.
///
/// Malformed bodies never fail: they fall back to a pass that only undoes
/// `\\` and `\<quote>`.
pub fn decode(raw: &str, quote: char) -> String {
    match strict(raw, quote) {
        Some(decoded) => decoded,
        None => {
            debug!("Malformed string literal, using the replace-only pass");
            conservative(raw, quote)
        }
    }
}

fn strict(raw: &str, quote: char) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == quote {
            return None;
        }
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => {
                // legacy octal escapes are not supported
                if chars.peek().is_some_and(char::is_ascii_digit) {
                    return None;
                }
                out.push('\0');
            }
            'x' => {
                let code = hex_digits(&mut chars, 2)?;
                out.push(char::from_u32(code)?);
            }
            'u' => out.push(unicode_escape(&mut chars)?),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            '\n' | '\u{2028}' | '\u{2029}' => {}
            other => out.push(other),
        }
    }
    Some(out)
}

fn hex_digits(chars: &mut Peekable<Chars>, count: usize) -> Option<u32> {
    let mut value = 0;
    for _ in 0..count {
        value = value * 16 + chars.next()?.to_digit(16)?;
    }
    Some(value)
}

fn code_unit(chars: &mut Peekable<Chars>) -> Option<u32> {
    if chars.peek() != Some(&'{') {
        return hex_digits(chars, 4);
    }
    chars.next();
    let mut value: u32 = 0;
    let mut digits = 0;
    loop {
        let ch = chars.next()?;
        if ch == '}' {
            break;
        }
        value = value.checked_mul(16)?.checked_add(ch.to_digit(16)?)?;
        digits += 1;
    }
    (digits > 0 && value <= 0x10FFFF).then_some(value)
}

fn unicode_escape(chars: &mut Peekable<Chars>) -> Option<char> {
    let unit = code_unit(chars)?;
    match unit {
        0xD800..=0xDBFF => {
            if chars.next()? != '\\' || chars.next()? != 'u' {
                return None;
            }
            let low = code_unit(chars)?;
            if !(0xDC00..=0xDFFF).contains(&low) {
                return None;
            }
            char::from_u32(0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00))
        }
        0xDC00..=0xDFFF => None,
        _ => char::from_u32(unit),
    }
}

fn conservative(raw: &str, quote: char) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '\\' || next == quote {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}
