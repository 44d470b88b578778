/// Clean structured PDF text before it reaches the field scanners.
///
/// Control characters and stray glyphs are dropped, runs of spaces inside a
/// line collapse to one (PDF text layers pad columns with spaces), lines are
/// trimmed and blank lines removed. Punctuation that carries clinical
/// meaning (units, ranges, ratios, degree signs) survives.
pub fn sanitize_extracted_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| {
            c.is_alphanumeric()
                || c.is_whitespace()
                || matches!(
                    c,
                    '.' | ','
                        | ';'
                        | ':'
                        | '-'
                        | '/'
                        | '('
                        | ')'
                        | '['
                        | ']'
                        | '+'
                        | '='
                        | '%'
                        | '#'
                        | '&'
                        | '\''
                        | '"'
                        | '<'
                        | '>'
                        | '*'
                        | '_'
                        | '°'
                        | 'º'
                        | '²'
                        | '³'
                        | 'µ'
                        | '\u{2013}' // en dash, used in ranges
                )
        })
        .collect::<String>()
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Non-whitespace character count, the measure of "readable" text.
pub fn visible_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}
