//! Color normalization.
//!
//! Every color in the canonical model is an uppercase `#RRGGBB` string.
//! Libraries report colors as `AARRGGBB`, bare `RRGGBB`, lowercase hex or the
//! `#RGB` shorthand; all of them collapse to the same canonical form.

/// Normalize a color string to `#RRGGBB`.
///
/// Returns `None` for anything that is not a hex color. An 8-digit value is
/// treated as `AARRGGBB` and the alpha channel is dropped.
pub fn normalize_color(raw: &str) -> Option<String> {
    let s = raw.trim();
    let s = s.strip_prefix('#').unwrap_or(s);
    if !s.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let rgb = match s.len() {
        8 => s[2..].to_string(),
        6 => s.to_string(),
        3 => s.chars().flat_map(|c| [c, c]).collect(),
        _ => return None,
    };
    Some(format!("#{}", rgb.to_ascii_uppercase()))
}

/// True for `#`-prefixed hex strings (`#RGB`, `#RRGGBB`, `#AARRGGBB`).
pub fn is_color_like(s: &str) -> bool {
    match s.strip_prefix('#') {
        Some(hex) => {
            matches!(hex.len(), 3 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

/// Compare two color-like strings after normalization. Case, the `#RGB`
/// shorthand and an opaque alpha prefix are ignored; a translucent alpha is not.
pub fn colors_equal(a: &str, b: &str) -> bool {
    if a.eq_ignore_ascii_case(b) {
        return true;
    }
    let canonical = |s: &str| -> Option<String> {
        let hex = s.strip_prefix('#')?;
        match hex.len() {
            8 if !hex[..2].eq_ignore_ascii_case("FF") => None,
            3 | 6 | 8 => normalize_color(hex),
            _ => None,
        }
    };
    match (canonical(a), canonical(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}
