//! Query string encoding
//!
//! Matches what browsers and the host's own URL handling produce: `:` and
//! `/` stay literal so redirect URIs remain readable, spaces become `+`.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Bytes escaped in keys and values. Space is left alone and turned into `+`.
const QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b' ')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/')
    .remove(b':')
    .remove(b'@')
    .remove(b'!')
    .remove(b'$')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b',')
    .remove(b'?');

fn encode_component(value: &str, out: &mut String) {
    out.push_str(&utf8_percent_encode(value, QUERY).to_string().replace(' ', "+"));
}

/// Encode `pairs` as `k=v&k=v`
pub fn encode_query<K, V>(pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut out = String::new();
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        encode_component(key.as_ref(), &mut out);
        out.push('=');
        encode_component(value.as_ref(), &mut out);
    }
    out
}

/// Append `pairs` to the query of `url`
pub fn update_query<K, V>(url: &str, pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    if pairs.is_empty() {
        return url.to_string();
    }
    let separator = match url.find('?') {
        None => '?',
        Some(pos) if pos + 1 == url.len() || url.ends_with('&') => {
            return format!("{}{}", url, encode_query(pairs));
        }
        Some(_) => '&',
    };
    format!("{}{}{}", url, separator, encode_query(pairs))
}
