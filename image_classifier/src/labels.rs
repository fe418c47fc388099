use crate::config::{LabelsConfig, Validatable};
use std::{
    collections::HashSet,
    fs::File,
    io::{self, BufRead},
    path::Path,
};

/// Class names indexed by model output position, loaded once at startup.
#[derive(Debug, Clone)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    pub fn new(labels_cfg: &LabelsConfig) -> Result<Self, String> {
        load_labels(&labels_cfg.get_path())
            .map(Self::from_names)
            .map_err(|e| format!("Failed to load labels: {}", e))
    }

    /// Later duplicates get their index appended so every label is a distinct JSON key.
    pub fn from_names(names: Vec<String>) -> Self {
        let mut seen = HashSet::with_capacity(names.len());
        let labels = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                if seen.insert(name.clone()) {
                    name
                } else {
                    let unique = format!("{} ({})", name, index);
                    tracing::warn!("Duplicate label {:?} at index {}, using {:?}", name, index, unique);
                    seen.insert(unique.clone());
                    unique
                }
            })
            .collect();
        Self { labels }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn get_labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

pub fn load_labels(filepath: &Path) -> io::Result<Vec<String>> {
    let file = File::open(filepath)?;
    parse_labels(io::BufReader::new(file))
}

fn parse_labels<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut labels = Vec::new();
    let mut blank_lines = 0;

    for line_result in reader.lines() {
        let line = line_result?;
        let label = line.trim();

        if label.is_empty() {
            blank_lines += 1;
            continue;
        }
        if blank_lines > 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Blank line before label {}", labels.len() + blank_lines + 1),
            ));
        }
        labels.push(label.to_string());
    }

    if labels.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Label file contains no labels",
        ));
    }

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_labels() {
        let input = "tench\n goldfish \ngreat white shark\n\n\n";
        let labels = parse_labels(Cursor::new(input)).unwrap();
        assert_eq!(labels, vec!["tench", "goldfish", "great white shark"]);
    }

    #[test]
    fn test_parse_labels_rejects_interior_blank_line() {
        let input = "tench\n\ngoldfish\n";
        let err = parse_labels(Cursor::new(input)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_parse_labels_rejects_empty_file() {
        assert!(parse_labels(Cursor::new("\n")).is_err());
    }

    #[test]
    fn test_duplicate_labels_are_made_unique() {
        let table = LabelTable::from_names(vec![
            "crane".to_string(),
            "goldfish".to_string(),
            "crane".to_string(),
        ]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0), Some("crane"));
        assert_eq!(table.get(2), Some("crane (2)"));
        assert_eq!(table.get(3), None);
    }

    #[test]
    fn test_load_missing_file() {
        let cfg = LabelsConfig {
            labels_file: "nope.txt".to_string(),
            labels_dir: "./missing_dir".into(),
            download_url: None,
        };
        assert!(LabelTable::new(&cfg).is_err());
    }
}
