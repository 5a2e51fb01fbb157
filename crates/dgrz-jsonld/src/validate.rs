use std::collections::{BTreeSet, HashMap};
use std::fmt;

use dgrz_types::{DgrzResult, Location, LocationKey};

use crate::document::DatasetDocument;

/// One problem found by [`validate_document`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Finding {
    /// A stageable resource with no ledger entry; staging it would fail.
    MissingMtime(Location),
    /// A ledger entry that matches no resource in the document.
    OrphanMtime(String),
    /// Two stageable resources share a location.
    DuplicateLocation(Location),
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingMtime(loc) => write!(f, "missing mtime: {loc}"),
            Self::OrphanMtime(key) => write!(f, "orphan mtime: {key}"),
            Self::DuplicateLocation(loc) => write!(f, "duplicate location: {loc}"),
        }
    }
}

/// Result of validating one dataset document.
#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    /// Addressable resources found by the walker.
    pub resources: usize,
    /// Of which stageable.
    pub stageable: usize,
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Walk `doc` and check the ledger against the resources it contains.
///
/// Structural errors (non-string `@id`, malformed `@context`) abort with the
/// walker's error; ledger problems are collected as findings.
pub fn validate_document(doc: &mut DatasetDocument) -> DgrzResult<ValidationReport> {
    let locations = doc.locations()?;
    let mut report = ValidationReport {
        resources: locations.len(),
        ..Default::default()
    };

    let mut seen: HashMap<LocationKey, usize> = HashMap::new();
    let mut known: BTreeSet<String> = BTreeSet::new();
    for location in &locations {
        let key = location.key();
        known.insert(key.to_hex());
        if !location.is_stageable() {
            continue;
        }
        report.stageable += 1;
        let count = seen.entry(key).or_insert(0);
        *count += 1;
        if *count == 2 {
            report.findings.push(Finding::DuplicateLocation(location.clone()));
        }
        if *count == 1 && !doc.ledger().contains(&key) {
            report.findings.push(Finding::MissingMtime(location.clone()));
        }
    }
    for (key, _) in doc.ledger().iter() {
        if !known.contains(key) {
            report.findings.push(Finding::OrphanMtime(key.to_string()));
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgrz_types::WorkspacePath;
    use serde_json::json;
    use std::path::PathBuf;

    fn doc(value: serde_json::Value) -> DatasetDocument {
        DatasetDocument::from_value(PathBuf::from("unused"), WorkspacePath::parse("d").unwrap(), value)
            .unwrap()
    }

    #[test]
    fn document_built_through_api_is_clean() {
        let mut d = doc(json!({"@context": {}, "@graph": []}));
        let path = d.dataset_path().clone();
        d.ledger_mut().touch(&Location::dataset(path.clone()).key());
        d.ledger_mut().touch(&Location::dataset_context(path).key());
        d.append_node(&"default".parse().unwrap(), json!({"@id": "urn:n"})).unwrap();

        let report = validate_document(&mut d).unwrap();
        assert!(report.is_clean(), "{:?}", report.findings);
        assert_eq!(report.resources, 3);
        assert_eq!(report.stageable, 3);
    }

    #[test]
    fn reports_missing_orphan_and_duplicate() {
        let mut d = doc(json!({"@graph": [{"@id": "urn:n"}, {"@id": "urn:n"}]}));
        d.ledger_mut().set(&LocationKey::from_hash([7; 32]), 5);

        let report = validate_document(&mut d).unwrap();
        assert!(report
            .findings
            .iter()
            .any(|f| matches!(f, Finding::MissingMtime(l) if l.object_iri() == "urn:n")));
        assert!(report
            .findings
            .iter()
            .any(|f| matches!(f, Finding::MissingMtime(l) if l.object_iri().is_empty())));
        assert!(report.findings.iter().any(|f| matches!(f, Finding::DuplicateLocation(_))));
        assert!(report.findings.iter().any(|f| matches!(f, Finding::OrphanMtime(_))));
    }
}
