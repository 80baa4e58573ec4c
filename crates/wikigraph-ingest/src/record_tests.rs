//! Tests for dump record decoding.

use super::*;

const HUMAN: &str = r#"{"type":"item","id":"Q5","pageid":1,"labels":{"en":{"language":"en","value":"human"}},"descriptions":{"en":{"language":"en","value":"common name of Homo sapiens"}},"claims":{"P31":[{"mainsnak":{"snaktype":"value","property":"P31","datatype":"wikibase-item","datavalue":{"value":{"entity-type":"item","numeric-id":515,"id":"Q515"},"type":"wikibase-entityid"}},"type":"statement","qualifiers":{"P580":[{"snaktype":"value","property":"P580","datatype":"time","datavalue":{"value":{"time":"+2020-00-00T00:00:00Z","precision":9},"type":"time"}}]},"rank":"normal"}]}},"#;

#[test]
fn test_from_dump_line_decodes_item() {
    let record = Record::from_dump_line(HUMAN, 2).unwrap().unwrap();

    assert_eq!(record.id, "Q5");
    assert_eq!(record.kind, EntityKind::Item);
    assert_eq!(record.page_id, Some(1));
    assert_eq!(record.label("en"), Some("human"));
    assert_eq!(record.description("en"), Some("common name of Homo sapiens"));
    assert_eq!(record.label("de"), None);

    let statements = &record.claims["P31"];
    assert_eq!(statements.len(), 1);
    assert_eq!(
        statements[0].main_value().and_then(TypedValue::entity_id),
        Some("Q515")
    );

    let qualifier = &statements[0].qualifiers["P580"][0];
    assert_eq!(
        qualifier.value.as_ref().map(ToString::to_string).as_deref(),
        Some("+2020-00-00T00:00:00Z")
    );
}

#[test]
fn test_from_dump_line_skips_brackets_and_blanks() {
    assert!(Record::from_dump_line("[", 1).unwrap().is_none());
    assert!(Record::from_dump_line("]", 99).unwrap().is_none());
    assert!(Record::from_dump_line("   ", 5).unwrap().is_none());
}

#[test]
fn test_from_dump_line_reports_line_number() {
    let err = Record::from_dump_line("{\"type\": \"item\"", 42).unwrap_err();
    assert!(matches!(err, Error::Record { line: 42, .. }));
}

#[test]
fn test_unknown_entity_kind_fails_loudly() {
    let line = r#"{"type":"lexeme","id":"L1"}"#;
    let err = Record::from_dump_line(line, 1).unwrap_err();
    assert!(matches!(err, Error::UnknownEntityKind(tag) if tag == "lexeme"));
}

#[test]
fn test_entity_kind_tags() {
    assert_eq!(EntityKind::from_tag("item").unwrap(), EntityKind::Item);
    assert_eq!(EntityKind::from_tag("property").unwrap(), EntityKind::Property);
    assert_eq!(EntityKind::from_tag("mediainfo").unwrap(), EntityKind::MediaInfo);
    assert!(EntityKind::from_tag("Item").is_err());
}

#[test]
fn test_mediainfo_reads_statements_and_empty_lists() {
    let line = r#"{"type":"mediainfo","id":"M7","labels":[],"descriptions":[],"statements":{"P180":[{"mainsnak":{"snaktype":"value","property":"P180","datavalue":{"value":{"entity-type":"item","numeric-id":146},"type":"wikibase-entityid"}}}]}}"#;

    let record = Record::from_dump_line(line, 1).unwrap().unwrap();

    assert_eq!(record.kind, EntityKind::MediaInfo);
    assert!(record.labels.is_empty());
    // numeric-id only: id rebuilt from the entity type
    assert_eq!(
        record.claims["P180"][0]
            .main_value()
            .and_then(TypedValue::entity_id),
        Some("Q146")
    );
}

#[test]
fn test_somevalue_snak_has_no_value() {
    let line = r#"{"type":"item","id":"Q1","claims":{"P40":[{"mainsnak":{"snaktype":"somevalue","property":"P40","datatype":"wikibase-item"}}]}}"#;

    let record = Record::from_dump_line(line, 1).unwrap().unwrap();

    assert!(record.claims["P40"][0].main_value().is_none());
}

#[test]
fn test_typed_value_flat_strings() {
    let cases = [
        (TypedValue::String("2020".to_string()), "2020"),
        (
            TypedValue::Quantity {
                amount: "+42".to_string(),
                unit: "1".to_string(),
            },
            "+42",
        ),
        (
            TypedValue::MonolingualText {
                text: "Paris".to_string(),
                language: "fr".to_string(),
            },
            "Paris",
        ),
        (
            TypedValue::GlobeCoordinate {
                latitude: 48.5,
                longitude: 2.25,
            },
            "48.5,2.25",
        ),
    ];

    for (value, expected) in cases {
        assert_eq!(value.to_string(), expected);
    }
}

#[test]
fn test_unmodelled_value_kept_as_other() {
    let line = r#"{"type":"item","id":"Q1","claims":{"P9":[{"mainsnak":{"snaktype":"value","property":"P9","datavalue":{"value":{"x":1},"type":"musical-notation"}}}]}}"#;

    let record = Record::from_dump_line(line, 1).unwrap().unwrap();

    match record.claims["P9"][0].main_value() {
        Some(TypedValue::Other { kind, raw }) => {
            assert_eq!(kind, "musical-notation");
            assert_eq!(raw, &serde_json::json!({"x": 1}));
        }
        other => panic!("unexpected value: {other:?}"),
    }
}
