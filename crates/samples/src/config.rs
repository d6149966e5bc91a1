use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_quotechar() -> String {
    "\"".to_string()
}

/// Configuration of a single sample, selected by `type`.
///
/// ```yaml
/// hosts:
///   type: csv
///   source: samples/hosts.csv
///   header: true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum SampleConfig {
    /// Inline list of scalars or lists.
    Items { source: Vec<serde_json::Value> },

    /// Delimited text file.
    Csv {
        source: PathBuf,
        #[serde(default)]
        header: bool,
        #[serde(default = "default_delimiter")]
        delimiter: String,
        #[serde(default = "default_quotechar")]
        quotechar: String,
    },

    /// JSON file holding an array of objects or an array of arrays.
    Json { source: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_defaults() {
        let config: SampleConfig =
            serde_json::from_value(serde_json::json!({"type": "csv", "source": "a.csv"})).unwrap();
        assert_eq!(
            config,
            SampleConfig::Csv {
                source: PathBuf::from("a.csv"),
                header: false,
                delimiter: ",".to_string(),
                quotechar: "\"".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: Result<SampleConfig, _> =
            serde_json::from_value(serde_json::json!({"type": "xml", "source": "a.xml"}));
        assert!(result.is_err());
    }
}
