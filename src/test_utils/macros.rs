use std::{io, path::Path};

use crate::sink::decode_rows;

/// Asserts that an [`EventRecord`](crate::types::EventRecord) carries the given fields.
///
/// Values are compared by their rendered text, so numbers, addresses and strings can be given in
/// whatever form is most readable.
///
/// # Examples
///
/// ```ignore
/// # use event_extractor::{assert_fields, types::EventRecord};
/// # let record = EventRecord::default();
/// assert_fields!(record, {
///     "event_name" => "Transfer",
///     "block_number" => 150,
/// });
/// ```
///
/// # Panics
///
/// * **Missing field**: the record has no value under one of the keys.
/// * **Wrong value**: a value renders differently than expected.
#[macro_export]
macro_rules! assert_fields {
    ($record: expr, { $($key: expr => $value: expr),+ $(,)? }) => {{
        let record = &$record;
        $(
            match record.get($key) {
                std::option::Option::Some(actual) => assert_eq!(
                    actual.to_string(),
                    $value.to_string(),
                    "Unexpected value for {:?} in {:#?}",
                    $key,
                    record,
                ),
                std::option::Option::None => panic!("Field {:?} missing from {:#?}", $key, record),
            }
        )+
    }};
}

/// Asserts the header and row count of a CSV file written by a
/// [`CsvSink`](crate::sink::CsvSink), returning the decoded data rows.
///
/// # Panics
///
/// * **Unreadable file**: the file does not exist or cannot be read.
/// * **Wrong header**: the first line differs from the expected column list.
/// * **Wrong row count**: the number of data rows differs (only checked when `rows = N` is given).
#[macro_export]
macro_rules! assert_csv {
    ($path: expr, header = $header: expr, rows = $count: expr) => {{
        let rows = $crate::assert_csv!($path, header = $header);
        assert_eq!(rows.len(), $count, "Unexpected row count in {:?}: {:#?}", $path, rows);
        rows
    }};
    ($path: expr, header = $header: expr) => {{
        let (header, rows) = $crate::test_utils::read_csv(&$path)
            .unwrap_or_else(|err| panic!("Cannot read {:?}: {err}", $path));
        let expected: std::vec::Vec<std::string::String> =
            $header.iter().map(std::string::ToString::to_string).collect();
        assert_eq!(header, expected, "Unexpected header in {:?}", $path);
        rows
    }};
}

/// Header and data rows of a CSV file. An empty file has an empty header.
///
/// # Errors
///
/// Any error reading the file.
pub fn read_csv(path: impl AsRef<Path>) -> io::Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut rows = decode_rows(&std::fs::read_to_string(path)?).into_iter();
    let header = rows.next().unwrap_or_default();
    Ok((header, rows.collect()))
}
