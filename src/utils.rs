use std::collections::HashMap;

/// Parse query parameters from a URL
pub fn parse_query_params(url: &str) -> HashMap<String, String> {
    match url.split_once('?') {
        Some((_, query)) => parse_urlencoded(query),
        None => HashMap::new(),
    }
}

/// Parse an `application/x-www-form-urlencoded` request body
pub fn parse_form_body(body: &[u8]) -> HashMap<String, String> {
    parse_urlencoded(&String::from_utf8_lossy(body))
}

/// Decode `key=value&key=value` pairs. Keys without `=` map to an empty value;
/// a repeated key keeps the last value.
pub fn parse_urlencoded(input: &str) -> HashMap<String, String> {
    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (url_decode(key), url_decode(value))
        })
        .collect()
}

/// Percent-decode a URL component. Escapes are collected as bytes and the
/// result is read as UTF-8, so multi-byte characters survive. Malformed
/// escapes are kept literally.
pub fn url_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => match (hex_value(bytes.get(i + 1)), hex_value(bytes.get(i + 2))) {
                (Some(hi), Some(lo)) => {
                    decoded.push(hi << 4 | lo);
                    i += 3;
                    continue;
                }
                _ => decoded.push(b'%'),
            },
            // Handle + as space in query parameters
            b'+' => decoded.push(b' '),
            b => decoded.push(b),
        }
        i += 1;
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

fn hex_value(byte: Option<&u8>) -> Option<u8> {
    let c = char::from(*byte?);
    c.to_digit(16).map(|d| d as u8)
}

/// Millisecond timestamp used to defeat image caching in links.
pub fn cache_buster() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
