//! Text-level rewrites between MongoDB extended-JSON wrappers and their
//! shell-literal display forms.
//!
//! mongoexport emits dates and object ids as single-key wrapper objects
//! (`{"$date": "..."}`, `{"$oid": "..."}`). These transforms move between
//! that wire form and the `ISODate(...)`/`ObjectId(...)` literal form used
//! for watermark values and hand-written filters. They deliberately operate
//! on the raw text instead of a parse/re-emit cycle: decoding and
//! re-encoding through a generic JSON codec would not preserve the exact
//! numeric and date precision mongoexport produced.
//!
//! The patterns are compile-time constants; an invalid pattern aborts at
//! first use instead of letting a transform silently return its input.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static DATE_WRAPPER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{"\$date":\s*("(?:\\"|[^"])*")\}"#).expect("date wrapper pattern")
});

static OID_WRAPPER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{"\$oid":\s*("(?:\\"|[^"])*")\}"#).expect("oid wrapper pattern")
});

static GTE_ISODATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""\$gte":"ISODate\((\\"(?:\\"|[^"])*\\")\)""#).expect("gte date pattern")
});

static GTE_OBJECT_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""\$gte":"ObjectId\((\\"(?:\\"|[^"])*\\")\)""#).expect("gte oid pattern")
});

static BARE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    // First alternative swallows string literals so their contents are
    // never mistaken for keys.
    Regex::new(r#"(?P<str>"(?:\\.|[^"\\])*")|(?P<pre>[{,])\s*(?P<key>[A-Za-z\d_\-]+?)\s*:"#)
        .expect("bare key pattern")
});

static ID_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""_id":\s*ObjectId\("([^"]*)"\)"#).expect("id literal pattern")
});

static TYPE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.\$(?:numberLong|numberInt|numberDouble|date)$|\.\$binary\.base64$")
        .expect("type suffix pattern")
});

/// Rewrite `{"$date": "..."}` and `{"$oid": "..."}` wrappers into
/// `"ISODate(...)"` / `"ObjectId(...)"` string literals.
///
/// The captured token keeps its surrounding quotes, re-escaped so the result
/// is still a valid JSON string: `{"$date":"D"}` becomes `"ISODate(\"D\")"`.
pub fn to_display(input: &str) -> String {
    let input = DATE_WRAPPER.replace_all(input, |caps: &Captures| {
        format!("\"ISODate({})\"", add_slashes(&caps[1]))
    });
    OID_WRAPPER
        .replace_all(&input, |caps: &Captures| {
            format!("\"ObjectId({})\"", add_slashes(&caps[1]))
        })
        .into_owned()
}

/// Rewrite a `$gte` clause's `"ISODate(...)"` / `"ObjectId(...)"` operand
/// back into `{"$date": ...}` / `{"$oid": ...}` object form.
///
/// Inverse of [`to_display`] for filter construction: a persisted watermark
/// in display form becomes a typed comparison value mongoexport accepts.
pub fn to_query(input: &str) -> String {
    let input = GTE_ISODATE.replace_all(input, |caps: &Captures| {
        format!("\"$gte\":{{\"$date\": {}}}", strip_slashes(&caps[1]))
    });
    GTE_OBJECT_ID
        .replace_all(&input, |caps: &Captures| {
            format!("\"$gte\":{{\"$oid\": {}}}", strip_slashes(&caps[1]))
        })
        .into_owned()
}

/// Add quotes around unquoted object keys in a hand-written filter, leaving
/// already-quoted keys and string contents untouched. Idempotent.
///
/// `{borough: "Bronx"}` becomes `{"borough": "Bronx"}`.
pub fn quote_bare_keys(input: &str) -> String {
    BARE_KEY
        .replace_all(input, |caps: &Captures| {
            if let Some(string) = caps.name("str") {
                string.as_str().to_string()
            } else {
                format!("{}\"{}\":", &caps["pre"], &caps["key"])
            }
        })
        .into_owned()
}

/// Rewrite a bare `ObjectId("...")` id literal inside a filter into
/// `{"$oid": "..."}` object form, so user-authored filters and
/// machine-authored incremental filters share one wire format.
pub fn literal_id_to_extended(input: &str) -> String {
    ID_LITERAL
        .replace_all(input, |caps: &Captures| {
            format!("\"_id\": {{\"$oid\": \"{}\"}}", &caps[1])
        })
        .into_owned()
}

/// Remove trailing BSON type-tag suffixes (`.$date`, `.$numberLong`,
/// `.$numberInt`, `.$numberDouble`, `.$binary.base64`) from a field path
/// used as a destination column name.
///
/// `.$oid` is intentionally left alone: id columns keep their wrapper
/// segment so they stay distinct from the raw `_id` value.
pub fn strip_type_suffixes(path: &str) -> String {
    let mut current = path.to_string();
    loop {
        let stripped = TYPE_SUFFIX.replace(&current, "").into_owned();
        if stripped == current {
            return current;
        }
        current = stripped;
    }
}

/// Escape quotes and backslashes for embedding in a JSON string literal.
fn add_slashes(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    for c in input.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Inverse of [`add_slashes`]: drop one level of backslash escaping.
fn strip_slashes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_to_display() {
        assert_eq!(
            to_display(r#"{"updatedAt":{"$date":"2016-05-18T16:00:00Z"}}"#),
            r#"{"updatedAt":"ISODate(\"2016-05-18T16:00:00Z\")"}"#
        );
    }

    #[test]
    fn test_oid_to_display() {
        assert_eq!(
            to_display(r#"{"_id":{"$oid":"5716054bee6e764c94fa7ddd"}}"#),
            r#"{"_id":"ObjectId(\"5716054bee6e764c94fa7ddd\")"}"#
        );
    }

    #[test]
    fn test_to_display_with_whitespace() {
        assert_eq!(
            to_display(r#"{"$date": "2016-05-18T16:00:00Z"}"#),
            r#""ISODate(\"2016-05-18T16:00:00Z\")""#
        );
    }

    #[test]
    fn test_gte_date_to_query() {
        assert_eq!(
            to_query(r#"{"updatedAt":{"$gte":"ISODate(\"2024-01-02T00:00:00Z\")"}}"#),
            r#"{"updatedAt":{"$gte":{"$date": "2024-01-02T00:00:00Z"}}}"#
        );
    }

    #[test]
    fn test_gte_oid_to_query() {
        assert_eq!(
            to_query(r#"{"_id":{"$gte":"ObjectId(\"5716054bee6e764c94fa7ddd\")"}}"#),
            r#"{"_id":{"$gte":{"$oid": "5716054bee6e764c94fa7ddd"}}}"#
        );
    }

    #[test]
    fn test_display_query_roundtrip() {
        // to_display ∘ to_query must be an identity on a $gte fragment.
        let fragment = r#""$gte":"ISODate(\"2024-01-02T00:00:00Z\")""#;
        assert_eq!(to_display(&to_query(fragment)), fragment);

        let oid_fragment = r#""$gte":"ObjectId(\"5716054bee6e764c94fa7ddd\")""#;
        assert_eq!(to_display(&to_query(oid_fragment)), oid_fragment);
    }

    #[test]
    fn test_roundtrip_with_escaped_quotes() {
        let fragment = r#""$gte":"ISODate(\"he said \\\"hi\\\"\")""#;
        assert_eq!(to_display(&to_query(fragment)), fragment);
    }

    #[test]
    fn test_quote_bare_keys() {
        assert_eq!(
            quote_bare_keys(r#"{borough: "Bronx"}"#),
            r#"{"borough": "Bronx"}"#
        );
        assert_eq!(
            quote_bare_keys(r#"{a: 1, b-2: 2, c_3: {d: 4}}"#),
            r#"{"a": 1,"b-2": 2,"c_3": {"d": 4}}"#
        );
    }

    #[test]
    fn test_quote_bare_keys_is_idempotent() {
        let once = quote_bare_keys(r#"{borough: "Bronx", nested: {x: 1}}"#);
        assert_eq!(quote_bare_keys(&once), once);
    }

    #[test]
    fn test_quote_bare_keys_leaves_string_contents() {
        let input = r#"{note: "a, b: c"}"#;
        assert_eq!(quote_bare_keys(input), r#"{"note": "a, b: c"}"#);
    }

    #[test]
    fn test_literal_id_to_extended() {
        assert_eq!(
            literal_id_to_extended(r#"{"_id": ObjectId("5716054bee6e764c94fa7ddd")}"#),
            r#"{"_id": {"$oid": "5716054bee6e764c94fa7ddd"}}"#
        );
    }

    #[test]
    fn test_strip_type_suffixes() {
        assert_eq!(strip_type_suffixes("updatedAt.$date"), "updatedAt");
        assert_eq!(strip_type_suffixes("count.$numberLong"), "count");
        assert_eq!(strip_type_suffixes("count.$numberInt"), "count");
        assert_eq!(strip_type_suffixes("price.$numberDouble"), "price");
        assert_eq!(strip_type_suffixes("payload.$binary.base64"), "payload");
        // The oid wrapper stays: id columns keep their suffix.
        assert_eq!(strip_type_suffixes("_id.$oid"), "_id.$oid");
        assert_eq!(strip_type_suffixes("plain.field"), "plain.field");
    }
}
