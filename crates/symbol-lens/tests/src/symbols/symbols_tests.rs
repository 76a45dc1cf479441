use std::sync::Arc;

use expect_test::expect;

use super::*;
use crate::stencil::Range;

fn file(path: &str) -> FileIdentity {
    FileIdentity::new("octo", "widgets", "0123456789abcdef0123456789abcdef01234567", path)
}

fn symbol() -> Symbol {
    Symbol {
        definition: Some(file("src/lib.rs").at(Range::new(3, 7, 12))),
        references: vec![file("src/lib.rs").at(Range::new(10, 4, 9)), file("src/main.rs").at(Range::new(1, 0, 5))],
        hover: Some("fn parse(input: &str)".to_string()),
    }
}

#[test]
fn hover_on_definition_is_hover_text_only() {
    let symbol = symbol();
    let definition = symbol.definition.clone().expect("fixture has a definition");
    assert_eq!(compose_hover(&symbol, &definition), "fn parse(input: &str)");

    let bare = Symbol {
        hover: None,
        ..symbol
    };
    assert_eq!(compose_hover(&bare, &definition), DEFINED_HERE);
}

#[test]
fn hover_on_reference_in_same_file_names_line() {
    let symbol = symbol();
    let hovered = file("src/lib.rs").at(Range::new(10, 4, 9));
    expect![[r#"
        fn parse(input: &str)

        ---

        Defined on line 4"#]]
    .assert_eq(&compose_hover(&symbol, &hovered));
}

#[test]
fn hover_on_reference_in_other_file_names_path() {
    let symbol = Symbol {
        hover: None,
        ..symbol()
    };
    let hovered = file("src/main.rs").at(Range::new(1, 0, 5));
    assert_eq!(compose_hover(&symbol, &hovered), "Defined in src/lib.rs");
}

#[test]
fn aliases_cover_every_other_occurrence_and_keep_ref() {
    let symbol = symbol();
    let key = SymbolKey::new(file("src/lib.rs").at(Range::new(10, 4, 9)), Some("refs/heads/main".to_string()));
    let aliases = symbol_aliases(&key, &Some(Arc::new(symbol)));
    assert_eq!(aliases.len(), 2);
    assert!(aliases.iter().all(|alias| alias.git_ref.as_deref() == Some("refs/heads/main")));
    assert!(aliases.iter().all(|alias| alias.range != key.range));
    assert!(symbol_aliases(&key, &None).is_empty());
}

#[test]
fn located_range_uses_flat_wire_format() {
    let json = r#"{"owner":"octo","repo":"widgets","commit":"abc","path":"a.rs","line":2,"characterStart":1,"characterEnd":4}"#;
    let range: LocatedRange = serde_json::from_str(json).expect("valid located range");
    assert_eq!(range.file.path, "a.rs");
    assert_eq!(range.range, Range::new(2, 1, 4));

    let symbol: Symbol = serde_json::from_str(&format!(r#"{{"references":[{json}]}}"#)).expect("valid symbol");
    assert!(symbol.definition.is_none());
    assert_eq!(symbol.references, vec![range]);
}

#[test]
fn still_processing_references_hovered_range() {
    let hovered = file("src/lib.rs").at(Range::new(0, 0, 2));
    let placeholder = still_processing(&hovered);
    assert_eq!(placeholder.references, vec![hovered.clone()]);
    assert_eq!(compose_hover(&placeholder, &hovered), STILL_PROCESSING);
}

#[test]
fn line_url_is_one_based() {
    assert_eq!(
        file("src/lib.rs").line_url(9),
        "https://github.com/octo/widgets/blob/0123456789abcdef0123456789abcdef01234567/src/lib.rs#L10"
    );
}
