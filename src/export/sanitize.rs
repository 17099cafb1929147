//! Sheet and file name sanitizers.
//!
//! Both sanitizers are idempotent: feeding their output back in returns
//! it unchanged.

/// Sheet name used when the requested one sanitizes to nothing.
pub const DEFAULT_SHEET_NAME: &str = "Report";

/// File name used when none is requested.
pub const DEFAULT_FILE_NAME: &str = "report.xlsx";

/// Longest sheet name a workbook accepts.
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Longest file name produced.
pub const MAX_FILE_NAME_LEN: usize = 200;

const FORBIDDEN_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

/// Sheet names the spreadsheet format reserves.
const RESERVED_SHEET_NAMES: [&str; 1] = ["history"];

/// Makes `name` a legal worksheet name.
#[must_use]
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !FORBIDDEN_SHEET_CHARS.contains(c) && !c.is_control())
        .take(MAX_SHEET_NAME_LEN)
        .collect();
    let trimmed = cleaned.trim_matches(|c: char| c.is_whitespace() || c == '\'');

    if trimmed.is_empty()
        || RESERVED_SHEET_NAMES
            .iter()
            .any(|r| trimmed.eq_ignore_ascii_case(r))
    {
        DEFAULT_SHEET_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Replaces every character outside `[A-Za-z0-9._-]` with `_` and caps the
/// length.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_LEN)
        .collect()
}

/// Builds the stored file name: default name, a millisecond stamp, and an
/// `.xlsx` extension replacing whatever extension was requested.
///
/// ```
/// use askdb::export::sanitize::stamped_file_name;
///
/// assert_eq!(stamped_file_name(Some("sales"), 1_718_000_000_000), "sales_1718000000000.xlsx");
/// assert_eq!(stamped_file_name(None, 7), "report_7.xlsx");
/// ```
#[must_use]
pub fn stamped_file_name(requested: Option<&str>, timestamp_millis: i64) -> String {
    let requested = requested
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_FILE_NAME);

    let stem = match requested.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => stem,
        _ => requested,
    };

    let suffix = format!("_{timestamp_millis}.xlsx");
    let room = MAX_FILE_NAME_LEN.saturating_sub(suffix.len());
    let stem: String = sanitize_file_name(stem).chars().take(room).collect();
    sanitize_file_name(&format!("{stem}{suffix}"))
}
