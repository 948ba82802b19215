//! Price text normalisation for vendor listings.

/// Parse the first price in `text`.
///
/// Accepts thousands separators (spaces, non-breaking spaces, thin spaces,
/// commas or dots), a decimal comma or dot, and surrounding currency marks:
/// `"1 250,50 ₽"`, `"$1,250.50"`, `"от 1.250.000 руб."`.
pub fn parse_price(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let run: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, ',' | '.') || is_group_space(*c))
        .filter(|c| !is_group_space(*c))
        .collect();
    let run = run.trim_end_matches([',', '.']);

    let normalized = match (run.rfind(','), run.rfind('.')) {
        (Some(comma), Some(dot)) => {
            let (decimal, group) = if comma > dot { (',', '.') } else { ('.', ',') };
            run.replace(group, "").replace(decimal, ".")
        }
        (Some(_), None) => single_separator(run, ','),
        (None, Some(_)) => single_separator(run, '.'),
        (None, None) => run.to_string(),
    };

    normalized.parse().ok().filter(|p: &f64| p.is_finite())
}

/// A lone separator kind is a decimal mark when it occurs once and is not
/// followed by exactly three digits; otherwise it groups thousands.
fn single_separator(run: &str, sep: char) -> String {
    let occurrences = run.matches(sep).count();
    let tail = run.rsplit(sep).next().map_or(0, str::len);
    if occurrences == 1 && tail != 3 {
        run.replace(sep, ".")
    } else {
        run.replace(sep, "")
    }
}

fn is_group_space(c: char) -> bool {
    matches!(c, ' ' | '\u{a0}' | '\u{202f}' | '\u{2009}' | '\'')
}
