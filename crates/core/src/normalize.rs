//! Attribute canonicalization. Every function here is pure,
//! deterministic, and idempotent: `normalize(normalize(x)) == normalize(x)`.

use std::collections::BTreeSet;

use url::Url;

use crate::entity::PartialDate;

/// Canonicalize a raw name string: lowercase, strip bracketed
/// annotations, fold Latin diacritics, collapse whitespace.
///
/// Non-Latin scripts pass through untouched. Stripping them would
/// silently delete content and make e.g. a Cyrillic-only label empty.
pub fn normalize_string(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let unbracketed = strip_brackets(&lowered);
    let folded = fold_diacritics(&unbracketed);
    collapse_whitespace(&folded)
}

/// Normalized, whitespace-split, deduplicated token set for a name.
pub fn name_tokens(raw: &str) -> BTreeSet<String> {
    normalize_string(raw)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// First token of the normalized name, if any. The default blocking key.
pub fn first_name_token(raw: &str) -> Option<String> {
    normalize_string(raw)
        .split_whitespace()
        .next()
        .map(str::to_string)
}

/// Parse `YYYY`, `YYYY-MM`, or `YYYY-MM-DD` into a [`PartialDate`].
///
/// Zero or unparseable components are recorded as unknown from that
/// point on (`1897-00-00` has year precision only).
pub fn normalize_date(raw: &str) -> PartialDate {
    let mut parts = raw.trim().splitn(3, '-');

    let year = parts
        .next()
        .and_then(|p| p.parse::<i32>().ok())
        .filter(|y| *y != 0);
    if year.is_none() {
        return PartialDate::default();
    }

    let month = parts
        .next()
        .and_then(|p| p.parse::<u32>().ok())
        .filter(|m| (1..=12).contains(m));
    let day = match month {
        Some(_) => parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .filter(|d| (1..=31).contains(d)),
        None => None,
    };

    PartialDate { year, month, day }
}

/// URL-normalize for comparison: lowercase scheme and host, strip a
/// leading `www.`, drop the fragment, drop a trailing slash.
///
/// Unparseable input is returned trimmed and lowercased rather than
/// discarded, so two equally malformed links still compare equal.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();

    let parsed = Url::parse(trimmed).or_else(|err| match err {
        url::ParseError::RelativeUrlWithoutBase => Url::parse(&format!("https://{trimmed}")),
        other => Err(other),
    });

    let url = match parsed {
        Ok(url) => url,
        Err(_) => return trimmed.to_lowercase(),
    };

    let host = match url.host_str() {
        Some(host) => host.strip_prefix("www.").unwrap_or(host).to_string(),
        None => return trimmed.to_lowercase(),
    };

    let mut normalized = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        normalized.push_str(&format!(":{port}"));
    }
    normalized.push_str(url.path().trim_end_matches('/'));
    if let Some(query) = url.query() {
        normalized.push('?');
        normalized.push_str(query);
    }

    normalized
}

/// Remove balanced `(...)` and `[...]` segments. Stray closers are
/// dropped; an unmatched opener swallows the rest of the string.
fn strip_brackets(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut depth = 0usize;

    for c in input.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }

    out
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_diacritics(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match fold_char(c) {
            Some(folded) => out.push_str(folded),
            None => out.push(c),
        }
    }
    out
}

// Latin diacritics only; input is already lowercased. Anything not in
// the table (including whole non-Latin scripts) is preserved.
fn fold_char(c: char) -> Option<&'static str> {
    let folded = match c {
        'á' | 'à' | 'ă' | 'â' | 'å' | 'ã' | 'ą' | 'ā' => "a",
        'ä' | 'æ' => "ae",
        'ć' | 'ĉ' | 'č' | 'ċ' | 'ç' => "c",
        'ď' | 'ḋ' | 'đ' => "d",
        'ð' => "dh",
        'é' | 'è' | 'ĕ' | 'ê' | 'ě' | 'ë' | 'ė' | 'ę' | 'ē' => "e",
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => "g",
        'ĥ' | 'ħ' => "h",
        'í' | 'ì' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ĵ' => "j",
        'ķ' => "k",
        'ĺ' | 'ļ' | 'ľ' | 'ł' => "l",
        'ñ' | 'ń' | 'ň' | 'ņ' => "n",
        'ó' | 'ò' | 'ô' | 'ő' | 'õ' | 'ō' => "o",
        'ö' | 'ø' | 'œ' => "oe",
        'ŕ' | 'ř' => "r",
        'ś' | 'ŝ' | 'š' | 'ş' => "s",
        'ß' => "ss",
        'ť' | 'ţ' => "t",
        'þ' => "th",
        'ú' | 'ù' | 'û' | 'ů' | 'ű' | 'ū' | 'ų' => "u",
        'ü' => "ue",
        'ŵ' => "w",
        'ý' | 'ŷ' | 'ÿ' => "y",
        'ź' | 'ž' | 'ż' => "z",
        _ => return None,
    };
    Some(folded)
}
