//! Sample loaders for inline items, CSV files and JSON files.

use crate::config::SampleConfig;
use crate::error::SampleLoadError;
use crate::row::FieldMap;
use crate::sample::Sample;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Load a sample described by `config`.
///
/// Relative file sources are resolved against `base_path`.
pub fn load_sample(config: &SampleConfig, base_path: &Path) -> Result<Sample, SampleLoadError> {
    match config {
        SampleConfig::Items { source } => rows_from_values(source.clone()),
        SampleConfig::Csv {
            source,
            header,
            delimiter,
            quotechar,
        } => {
            let path = resolve(base_path, source);
            let delimiter = single_byte("delimiter", delimiter)?;
            let quote = single_byte("quotechar", quotechar)?;
            load_csv(&path, *header, delimiter, quote)
        }
        SampleConfig::Json { source } => load_json(&resolve(base_path, source)),
    }
}

fn resolve(base_path: &Path, source: &Path) -> PathBuf {
    if source.is_absolute() {
        source.to_path_buf()
    } else {
        base_path.join(source)
    }
}

fn single_byte(option: &'static str, value: &str) -> Result<u8, SampleLoadError> {
    match value.as_bytes() {
        [byte] if byte.is_ascii() => Ok(*byte),
        _ => Err(SampleLoadError::InvalidOption {
            option,
            reason: format!("expected a single ASCII character, got `{value}`"),
        }),
    }
}

fn load_csv(
    path: &Path,
    header: bool,
    delimiter: u8,
    quote: u8,
) -> Result<Sample, SampleLoadError> {
    let file = std::fs::File::open(path).map_err(|source| SampleLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(header)
        .delimiter(delimiter)
        .quote(quote)
        .from_reader(file);

    let csv_error = |source: csv::Error| {
        if let csv::ErrorKind::UnequalLengths {
            pos,
            expected_len,
            len,
        } = source.kind()
        {
            return SampleLoadError::CsvInconsistentColumns {
                path: path.to_path_buf(),
                row: pos.as_ref().map(|p| p.line()).unwrap_or_default(),
                expected: *expected_len,
                found: *len,
            };
        }
        SampleLoadError::Csv {
            path: path.to_path_buf(),
            source,
        }
    };

    let names = if header {
        Some(
            reader
                .headers()
                .map_err(csv_error)?
                .iter()
                .map(|h| h.to_string())
                .collect::<Vec<_>>(),
        )
    } else {
        None
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        rows.push(
            record
                .iter()
                .map(|field| Value::String(field.to_string()))
                .collect::<Vec<_>>(),
        );
    }

    let fields = match names {
        Some(names) => FieldMap::new(names),
        None => FieldMap::ordinal(rows.first().map(Vec::len).unwrap_or_default()),
    };

    debug!(
        "Loaded CSV sample {} with {} row(s) and {} column(s)",
        path.display(),
        rows.len(),
        fields.len()
    );

    Ok(Sample::new(fields, rows))
}

fn load_json(path: &Path) -> Result<Sample, SampleLoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| SampleLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let document: Value =
        serde_json::from_str(&content).map_err(|source| SampleLoadError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    let Value::Array(items) = document else {
        return Err(SampleLoadError::Layout(format!(
            "JSON sample {} must contain a top-level array",
            path.display()
        )));
    };

    let sample = rows_from_values(items)?;
    debug!(
        "Loaded JSON sample {} with {} row(s)",
        path.display(),
        sample.len()
    );
    Ok(sample)
}

/// Build a sample from a list of values.
///
/// A list made entirely of objects yields named columns taken from the first
/// object's keys. Otherwise each list element becomes a row and each scalar a
/// single-column row, with ordinal names.
fn rows_from_values(items: Vec<Value>) -> Result<Sample, SampleLoadError> {
    if !items.is_empty() && items.iter().all(Value::is_object) {
        return rows_from_objects(items);
    }

    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Array(values) => rows.push(values),
            Value::Object(_) => {
                return Err(SampleLoadError::Layout(
                    "objects cannot be mixed with scalars or lists".to_string(),
                ))
            }
            scalar => rows.push(vec![scalar]),
        }
    }

    let width = rows.first().map(Vec::len).unwrap_or_default();
    if let Some((row, values)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(SampleLoadError::InconsistentColumns {
            row,
            expected: width,
            found: values.len(),
        });
    }

    Ok(Sample::new(FieldMap::ordinal(width), rows))
}

fn rows_from_objects(items: Vec<Value>) -> Result<Sample, SampleLoadError> {
    let names: Vec<String> = match items.first() {
        Some(Value::Object(first)) => first.keys().cloned().collect(),
        _ => Vec::new(),
    };

    let mut rows = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(mut object) = item else {
            return Err(SampleLoadError::JsonInconsistentKeys { index });
        };

        if object.len() != names.len() || !names.iter().all(|name| object.contains_key(name)) {
            return Err(SampleLoadError::JsonInconsistentKeys { index });
        }

        rows.push(
            names
                .iter()
                .map(|name| object.remove(name).unwrap_or(Value::Null))
                .collect(),
        );
    }

    Ok(Sample::new(FieldMap::new(names), rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn csv_config(source: &str, header: bool) -> SampleConfig {
        SampleConfig::Csv {
            source: PathBuf::from(source),
            header,
            delimiter: ",".to_string(),
            quotechar: "\"".to_string(),
        }
    }

    #[test]
    fn test_items_scalars_become_single_column_rows() {
        let config = SampleConfig::Items {
            source: vec![json!("alpha"), json!("beta"), json!(3)],
        };
        let sample = load_sample(&config, Path::new(".")).unwrap();
        assert_eq!(sample.len(), 3);
        assert_eq!(sample.fields().names(), &["_0"]);
        assert_eq!(sample.get(2).unwrap().get("_0"), Some(&json!(3)));
    }

    #[test]
    fn test_items_lists_become_rows() {
        let config = SampleConfig::Items {
            source: vec![json!(["a", 1]), json!(["b", 2])],
        };
        let sample = load_sample(&config, Path::new(".")).unwrap();
        assert_eq!(sample.get(1).unwrap().get_index(1), Some(&json!(2)));
    }

    #[test]
    fn test_items_inconsistent_widths() {
        let config = SampleConfig::Items {
            source: vec![json!(["a", 1]), json!(["b"])],
        };
        let err = load_sample(&config, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("inconsistent column counts"));
    }

    #[test]
    fn test_items_without_headers_has_no_weight_column() {
        let config = SampleConfig::Items {
            source: vec![json!(["a", 1])],
        };
        let sample = load_sample(&config, Path::new(".")).unwrap();
        let err = sample.weighted_pick("weight").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_csv_quoted_delimiter_is_one_field() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "hosts.csv", "name,desc\ndb1,\"primary, eu\"\ndb2,replica\n");

        let sample = load_sample(&csv_config("hosts.csv", true), dir.path()).unwrap();
        assert_eq!(sample.len(), 2);
        assert_eq!(sample.get(0).unwrap().get("desc"), Some(&json!("primary, eu")));
    }

    #[test]
    fn test_csv_unquoted_delimiter_is_inconsistent() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "hosts.csv", "db1,primary\ndb2,primary, eu\n");

        let err = load_sample(&csv_config("hosts.csv", false), dir.path()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("inconsistent column counts"), "{message}");
        assert!(message.contains("RFC 4180"), "{message}");
    }

    #[test]
    fn test_csv_without_header_uses_ordinal_names() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "levels.csv", "info;70\nwarn;20\n");

        let config = SampleConfig::Csv {
            source: PathBuf::from("levels.csv"),
            header: false,
            delimiter: ";".to_string(),
            quotechar: "\"".to_string(),
        };
        let sample = load_sample(&config, dir.path()).unwrap();
        assert_eq!(sample.fields().names(), &["_0", "_1"]);
        assert_eq!(sample.get(1).unwrap().get("_1"), Some(&json!("20")));
    }

    #[test]
    fn test_csv_rejects_multichar_delimiter() {
        let config = SampleConfig::Csv {
            source: PathBuf::from("x.csv"),
            header: false,
            delimiter: "::".to_string(),
            quotechar: "\"".to_string(),
        };
        let err = load_sample(&config, Path::new(".")).unwrap_err();
        assert!(matches!(
            err,
            SampleLoadError::InvalidOption {
                option: "delimiter",
                ..
            }
        ));
    }

    #[test]
    fn test_json_objects_keep_key_order() {
        let dir = TempDir::new().unwrap();
        write_file(
            &dir,
            "users.json",
            r#"[{"name": "alice", "role": "admin"}, {"role": "dev", "name": "bob"}]"#,
        );

        let config = SampleConfig::Json {
            source: PathBuf::from("users.json"),
        };
        let sample = load_sample(&config, dir.path()).unwrap();
        assert_eq!(sample.fields().names(), &["name", "role"]);
        assert_eq!(sample.get(1).unwrap().get_index(0), Some(&json!("bob")));
    }

    #[test]
    fn test_json_inconsistent_keys() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "users.json", r#"[{"name": "alice"}, {"user": "bob"}]"#);

        let config = SampleConfig::Json {
            source: PathBuf::from("users.json"),
        };
        let err = load_sample(&config, dir.path()).unwrap_err();
        assert!(err
            .to_string()
            .contains("JSON sample objects have inconsistent keys"));
    }

    #[test]
    fn test_json_array_of_arrays() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "pairs.json", r#"[["a", 1], ["b", 2]]"#);

        let config = SampleConfig::Json {
            source: PathBuf::from("pairs.json"),
        };
        let sample = load_sample(&config, dir.path()).unwrap();
        assert_eq!(sample.get(0).unwrap().get("_1"), Some(&json!(1)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_sample(&csv_config("absent.csv", false), Path::new("/nonexistent"))
            .unwrap_err();
        assert!(matches!(err, SampleLoadError::Io { .. }));
    }
}
