use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use unicode_width::UnicodeWidthStr;

/// Mapping workbook looked up beside the input when `--mapping` is omitted.
pub(crate) const DEFAULT_MAPPING_FILE: &str = "Script_Config.xlsx";

/// Display width of a string, accounting for CJK double-width, emoji, etc.
pub(crate) fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Truncate a string to fit within `width` display columns, adding ".." if truncated.
pub(crate) fn truncate_display(s: &str, width: usize) -> String {
    if width < 3 {
        for ch in s.chars() {
            let cw = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
            if cw <= width {
                return ch.to_string();
            }
        }
        return String::new();
    }

    if display_width(s) <= width {
        return s.to_string();
    }

    // stop at width - 2 to leave room for ".."
    let budget = width - 2;
    let mut used = 0;
    let mut end_byte = 0;
    for (i, ch) in s.char_indices() {
        let cw = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + cw > budget {
            end_byte = i;
            break;
        }
        used += cw;
        end_byte = i + ch.len_utf8();
    }

    format!("{}..", &s[..end_byte])
}

/// Pad or truncate a string to exactly `width` display columns.
pub(crate) fn pad_right(s: &str, width: usize) -> String {
    let sw = display_width(s);
    if sw > width {
        truncate_display(s, width)
    } else {
        format!("{}{}", s, " ".repeat(width - sw))
    }
}

/// `Script_Config.xlsx` in the input workbook's directory, if it exists.
pub(crate) fn find_mapping_beside(input: &Path) -> Option<PathBuf> {
    let dir = match input.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let candidate = dir.join(DEFAULT_MAPPING_FILE);
    candidate.is_file().then_some(candidate)
}

/// Ask on `out`, read one line from `input`. Only "yes", in any case, confirms.
pub(crate) fn confirm(prompt: &str, input: &mut impl BufRead, out: &mut impl Write) -> io::Result<bool> {
    write!(out, "{prompt} Type 'yes' to continue: ")?;
    out.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().eq_ignore_ascii_case("yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_width_cjk() {
        // CJK characters are 2 display columns each
        assert_eq!(display_width("\u{4e16}\u{754c}"), 4);
    }

    #[test]
    fn truncate_fits() {
        assert_eq!(truncate_display("Sensors", 24), "Sensors");
        assert_eq!(truncate_display("abc", 3), "abc");
    }

    #[test]
    fn truncate_cuts() {
        assert_eq!(truncate_display("Instrument Index Revision 7", 24), "Instrument Index Revis..");
        assert_eq!(truncate_display("abcdef", 4), "ab..");
    }

    #[test]
    fn truncate_narrow() {
        assert_eq!(truncate_display("abc", 2), "a");
        assert_eq!(truncate_display("", 0), "");
    }

    #[test]
    fn pad_right_short_and_long() {
        assert_eq!(pad_right("ab", 5), "ab   ");
        assert_eq!(pad_right("abcde", 5), "abcde");
        assert_eq!(pad_right("abcdef", 5), "abc..");
    }

    #[test]
    fn mapping_found_beside_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tags.xlsx");
        assert_eq!(find_mapping_beside(&input), None);

        std::fs::write(dir.path().join(DEFAULT_MAPPING_FILE), b"").unwrap();
        assert_eq!(
            find_mapping_beside(&input),
            Some(dir.path().join(DEFAULT_MAPPING_FILE))
        );
    }

    #[test]
    fn confirmation_requires_yes() {
        let mut out = Vec::new();
        assert!(confirm("Apply?", &mut "yes\n".as_bytes(), &mut out).unwrap());
        assert!(confirm("Apply?", &mut " YES \n".as_bytes(), &mut out).unwrap());
        assert!(!confirm("Apply?", &mut "y\n".as_bytes(), &mut out).unwrap());
        assert!(!confirm("Apply?", &mut "".as_bytes(), &mut out).unwrap());
        assert!(String::from_utf8(out).unwrap().starts_with("Apply? Type 'yes'"));
    }
}
