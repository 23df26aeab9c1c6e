//! End-to-end dump-file scenarios exercised through the public codec and
//! storage APIs, without a database.

use mysql_backup::codec::{RowReader, RowWriter, Value};
use mysql_backup::db::ColumnClass;
use mysql_backup::storage::{Compression, DumpCompression, Location};
use std::io::Write;
use tempfile::TempDir;

fn field(s: &str) -> Option<Vec<u8>> {
    Some(s.as_bytes().to_vec())
}

#[test]
fn test_empty_table_file_round_trip() {
    // A table with no rows produces a file holding only the header line.
    let temp = TempDir::new().unwrap();
    let dest = Location::Local(temp.path().to_path_buf());
    let compression = DumpCompression::Bzip2;
    let name = format!("t.csjson.{}", compression.ext());

    let mut writer = RowWriter::new(compression.wrap(dest.create(&name).unwrap()));
    writer.write_header(&["a".to_string()]).unwrap();
    writer.into_inner().finish().unwrap();

    let found = dest.list("t").unwrap();
    assert_eq!(found, vec![name.clone()]);

    let reader = Compression::from_name(&name)
        .wrap_reader(dest.open(&name).unwrap())
        .unwrap();
    let rows: Vec<_> = RowReader::new(reader)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_null_and_numeric_round_trip_through_file() {
    // Row (1, NULL, 3.14) in t(a int, b varchar(10), c double) is encoded
    // as the literal plaintext line `1,,3.14`.
    let classes = [
        ColumnClass::Numeric,
        ColumnClass::String,
        ColumnClass::Numeric,
    ];

    let mut writer = RowWriter::new(Vec::new());
    writer
        .write_row(&[field("1"), None, field("3.14")], &classes)
        .unwrap();
    let plain = writer.into_inner();
    assert_eq!(plain, b"1,,3.14\n");

    let temp = TempDir::new().unwrap();
    let dest = Location::Local(temp.path().to_path_buf());
    let compression = DumpCompression::Gzip;
    let name = format!("t.csjson.{}", compression.ext());
    let mut out = compression.wrap(dest.create(&name).unwrap());
    out.write_all(&plain).unwrap();
    out.finish().unwrap();

    let reader = Compression::from_name(&name)
        .wrap_reader(dest.open(&name).unwrap())
        .unwrap();
    let rows: Vec<_> = RowReader::new(reader)
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(
        rows,
        vec![vec![Value::Int(1), Value::Null, Value::Float(3.14)]]
    );
}

#[test]
fn test_string_with_comma_and_newline_round_trip() {
    let classes = [ColumnClass::String];
    let mut writer = RowWriter::new(Vec::new());
    writer
        .write_row(&[field("hello,\nworld")], &classes)
        .unwrap();
    let plain = writer.into_inner();

    // The value must stay on one physical line.
    assert_eq!(plain.iter().filter(|&&b| b == b'\n').count(), 1);
    assert_eq!(plain, b"\"hello,\\nworld\"\n");

    let rows: Vec<_> = RowReader::new(&plain[..])
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(rows, vec![vec![Value::Str("hello,\nworld".into())]]);
}

#[test]
fn test_multi_row_file_with_header() {
    let classes = [ColumnClass::Numeric, ColumnClass::String];
    let mut writer = RowWriter::new(Vec::new());
    writer
        .write_header(&["id".to_string(), "name".to_string()])
        .unwrap();
    writer.write_row(&[field("1"), field("alice")], &classes).unwrap();
    writer.write_row(&[field("2"), None], &classes).unwrap();
    writer.write_row(&[field("3"), field("bob")], &classes).unwrap();
    let plain = writer.into_inner();

    let rows: Vec<_> = RowReader::new(&plain[..])
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1], vec![Value::Int(2), Value::Null]);
    assert_eq!(rows[2], vec![Value::Int(3), Value::Str("bob".into())]);
}

#[test]
fn test_every_class_round_trips() {
    let classes = [
        ColumnClass::Numeric,
        ColumnClass::Numeric,
        ColumnClass::String,
        ColumnClass::Binary,
        ColumnClass::String,
    ];
    let mut writer = RowWriter::new(Vec::new());
    writer
        .write_row(
            &[
                field("-42"),
                field("2.5"),
                field("text value"),
                field("binary\tdata"),
                None,
            ],
            &classes,
        )
        .unwrap();
    let rows: Vec<_> = RowReader::new(&writer.into_inner()[..])
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(
        rows,
        vec![vec![
            Value::Int(-42),
            Value::Float(2.5),
            Value::Str("text value".into()),
            Value::Str("binary\tdata".into()),
            Value::Null,
        ]]
    );
}
