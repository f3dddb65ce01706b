// SPDX-License-Identifier: MIT

use phonebook::utils::{parse_form_body, parse_query_params, url_decode};

#[test]
fn test_parse_query_params_basic_and_plus_space() {
    let params = parse_query_params("/search?query=grace+hopper&x=1&y=%2Froot");
    assert_eq!(params.get("query").unwrap(), "grace hopper");
    assert_eq!(params.get("x").unwrap(), "1");
    assert_eq!(params.get("y").unwrap(), "/root");
}

#[test]
fn test_parse_query_params_without_query() {
    assert!(parse_query_params("/search").is_empty());
    assert!(parse_query_params("/search?").is_empty());
}

#[test]
fn test_parse_query_params_key_without_value() {
    let params = parse_query_params("/image?id&t=1");
    assert_eq!(params.get("id").unwrap(), "");
    assert_eq!(params.get("t").unwrap(), "1");
}

#[test]
fn test_url_decode_multibyte() {
    assert_eq!(url_decode("Zo%C3%AB"), "Zoë");
    assert_eq!(url_decode("%E6%97%A5%E6%9C%AC"), "日本");
}

#[test]
fn test_url_decode_malformed_escapes_kept() {
    assert_eq!(url_decode("100%"), "100%");
    assert_eq!(url_decode("%zz"), "%zz");
    assert_eq!(url_decode("%4"), "%4");
}

#[test]
fn test_parse_form_body() {
    let params = parse_form_body(b"id=2&name=A%26B&name=last");
    assert_eq!(params.get("id").unwrap(), "2");
    assert_eq!(params.get("name").unwrap(), "last");
}
