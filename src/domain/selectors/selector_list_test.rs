// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::*;
use crate::domain::selectors::{PostProcessor, SelectorKind};
use serde_json::json;

fn compile(configs: Vec<SelectorConfig>) -> SelectorList {
    SelectorList::compile(&configs).expect("selectors should compile")
}

#[test]
fn test_required_field_invalidates_whole_record() {
    let list = compile(vec![
        SelectorConfig::new("price", SelectorKind::Regex, r"\$(\d+)").required(),
        SelectorConfig::new("source", SelectorKind::Static, "shop-a"),
    ]);

    let extracted = list.extract_batch(&[json!("<html>$10</html>"), json!("<html>no price</html>")]);

    assert_eq!(
        extracted.into_data(),
        vec![
            json!({"price": "10", "source": "shop-a"}),
            json!({"price": null, "source": null}),
        ]
    );
}

#[test]
fn test_reuse_degenerates_to_bare_value() {
    let list = compile(vec![SelectorConfig::new(
        "REUSE",
        SelectorKind::Regex,
        r"next=(\d+)",
    )]);

    let extracted = list.extract_batch(&[json!("next=42")]);

    assert_eq!(extracted, Extracted::Reuse(json!("42")));
    assert_eq!(extracted.into_data(), vec![json!("42")]);
}

#[test]
fn test_reuse_over_many_items_keeps_records() {
    let list = compile(vec![SelectorConfig::new(
        "REUSE",
        SelectorKind::Regex,
        r"next=(\d+)",
    )]);

    let extracted = list.extract_batch(&[json!("next=1"), json!("next=2")]);

    assert_eq!(
        extracted,
        Extracted::Records(vec![
            json!({"REUSE": "1"}).as_object().cloned().unwrap(),
            json!({"REUSE": "2"}).as_object().cloned().unwrap(),
        ])
    );
}

#[test]
fn test_reuse_miss_yields_no_data() {
    let list = compile(vec![SelectorConfig::new(
        "REUSE",
        SelectorKind::Regex,
        r"next=(\d+)",
    )]);

    assert!(list.extract_batch(&[json!("last page")]).into_data().is_empty());
}

#[test]
fn test_all_protocol_flattens_across_items() {
    let list = compile(vec![
        SelectorConfig::new("links", SelectorKind::Regex, r#"href="([^"]+)""#).all(),
    ]);
    let pages = [
        json!(r#"<a href="/a">a</a><a href="/b">b</a>"#),
        json!(r#"<a href="/c">c</a>"#),
    ];

    assert_eq!(
        list.extract_batch(&pages),
        Extracted::Flat(vec![json!("/a"), json!("/b"), json!("/c")])
    );
}

#[test]
fn test_first_returns_default_on_miss() {
    let list = compile(vec![
        SelectorConfig::new("stock", SelectorKind::Regex, r"stock: (\d+)").with_default("0"),
    ]);

    assert_eq!(list.extract(&json!("sold out")), json!({"stock": "0"}).as_object().cloned().unwrap());
}

#[test]
fn test_regex_without_group_returns_whole_match() {
    let list = compile(vec![SelectorConfig::new("isbn", SelectorKind::Regex, r"\d{3}-\d{10}")]);

    assert_eq!(list.extract(&json!("ISBN 978-0441172719"))["isbn"], json!("978-0441172719"));
}

#[test]
fn test_json_first_walks_path() {
    let list = compile(vec![
        SelectorConfig::new("title", SelectorKind::Json, r#"["items", 1, "title"]"#),
        SelectorConfig::new("total", SelectorKind::Json, "meta.total"),
    ]);
    let body = json!(r#"{"items": [{"title": "a"}, {"title": "b"}], "meta": {"total": 2}}"#);

    let record = list.extract(&body);

    assert_eq!(record["title"], json!("b"));
    assert_eq!(record["total"], json!(2));
}

#[test]
fn test_json_all_yields_nothing() {
    let list = compile(vec![SelectorConfig::new("ids", SelectorKind::Json, "ids").all()]);

    assert_eq!(list.extract(&json!(r#"{"ids": [1, 2]}"#))["ids"], json!([]));
}

#[test]
fn test_json_on_invalid_input_returns_default() {
    let list = compile(vec![
        SelectorConfig::new("title", SelectorKind::Json, "title").with_default("untitled"),
    ]);

    assert_eq!(list.extract(&json!("<html></html>"))["title"], json!("untitled"));
}

#[test]
fn test_css_first_and_all() {
    let list = compile(vec![
        SelectorConfig::new("title", SelectorKind::Css, "h1.title"),
        SelectorConfig::new("tags", SelectorKind::Css, "ul.tags li").all(),
    ]);
    let page = json!(
        r#"<html><body><h1 class="title">Dune</h1><ul class="tags"><li>sf</li><li>classic</li></ul></body></html>"#
    );

    let record = list.extract(&page);

    assert_eq!(record["title"], json!("Dune"));
    assert_eq!(record["tags"], json!(["sf", "classic"]));
}

#[test]
fn test_xpath_first() {
    let list = compile(vec![SelectorConfig::new(
        "heading",
        SelectorKind::Xpath,
        "//*[local-name()='h1']",
    )]);
    let page = json!("<html><body><h1>Dune</h1><h1>Messiah</h1></body></html>");

    assert_eq!(list.extract(&page)["heading"], json!("Dune"));
}

#[test]
fn test_xpath_count_is_stringified() {
    let list = compile(vec![SelectorConfig::new(
        "headings",
        SelectorKind::Xpath,
        "count(//*[local-name()='h1'])",
    )]);
    let page = json!("<html><body><h1>Dune</h1><h1>Messiah</h1></body></html>");

    assert_eq!(list.extract(&page)["headings"], json!("2"));
}

#[test]
fn test_post_processor_failure_keeps_raw_value() {
    let list = compile(vec![SelectorConfig::new("price", SelectorKind::Regex, r"price: (\S+)")
        .with_post_processor(PostProcessor::ToNumber)]);

    assert_eq!(list.extract(&json!("price: 12"))["price"], json!(12));
    assert_eq!(list.extract(&json!("price: n/a"))["price"], json!("n/a"));
}

#[test]
fn test_empty_list_passes_data_through() {
    let list = compile(Vec::new());
    let data = vec![json!("https://a.example"), json!("https://b.example")];

    assert_eq!(list.extract_batch(&data), Extracted::Passthrough(data.clone()));
}

#[test]
fn test_invalid_directive_fails_to_compile() {
    assert!(SelectorList::compile(&[SelectorConfig::new("x", SelectorKind::Regex, "(")]).is_err());
    assert!(SelectorList::compile(&[SelectorConfig::new("x", SelectorKind::Css, "<<")]).is_err());
    assert!(SelectorList::compile(&[SelectorConfig::new("x", SelectorKind::Json, "[{}]")]).is_err());
}

#[test]
fn test_kind_and_method_parse_case_insensitively() {
    let config: SelectorConfig = serde_json::from_value(json!({
        "name": "price",
        "type": "ReGeX",
        "method": "ALL",
        "directive": "\\d+"
    }))
    .unwrap();

    assert_eq!(config.kind, SelectorKind::Regex);
    assert_eq!(config.method, SelectorMethod::All);
}
