use veil_core::{ColumnMetaData, TableMetaData, ValueType};

#[test]
fn serializes_metadata_deterministically() {
    let table = TableMetaData {
        schema: Some("public".to_string()),
        name: "users".to_string(),
        columns: vec![
            ColumnMetaData::new("id", "int4", ValueType::Int).primary_key(),
            ColumnMetaData::new("tags", "_text", ValueType::list_of(ValueType::Text)),
        ],
    };

    let json = serde_json::to_string_pretty(&table).expect("serialize metadata");
    let expected = r#"{
  "schema": "public",
  "name": "users",
  "columns": [
    {
      "name": "id",
      "sql_type": "int4",
      "value_type": "int",
      "size": null,
      "primary_key": true,
      "foreign_key": false,
      "nullable": false
    },
    {
      "name": "tags",
      "sql_type": "_text",
      "value_type": "list<text>",
      "size": null,
      "primary_key": false,
      "foreign_key": false,
      "nullable": true
    }
  ]
}"#;
    assert_eq!(json, expected);

    let parsed: TableMetaData = serde_json::from_str(&json).expect("parse metadata");
    assert_eq!(parsed, table);
}

#[test]
fn rejects_unknown_value_types() {
    let result = serde_json::from_str::<ValueType>("\"blob\"");
    assert!(result.is_err());
}
