use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use dgrz_types::{DgrzError, DgrzResult, Location, ResourceKind, WorkspacePath};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::ledger::{MtimeLedger, LEDGER_KEY};
use crate::walker::{self, Visitor, CONTEXT, GRAPH, ID};

/// File name of a dataset document inside its directory.
pub const DOCUMENT_FILE_NAME: &str = "_dataset.jsonld";

/// Where the document for `dataset` lives inside a grapplication.
pub fn document_path(grapp_root: &Path, dataset: &WorkspacePath) -> PathBuf {
    grapp_root.join(dataset.to_path_buf()).join(DOCUMENT_FILE_NAME)
}

/// Target graph for a new member: the dataset's default graph or a named
/// graph identified by IRI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphSelector {
    Default,
    Named(String),
}

impl FromStr for GraphSelector {
    type Err = DgrzError;

    fn from_str(s: &str) -> DgrzResult<Self> {
        match s {
            "" => Err(DgrzError::invalid_value("graph selector is empty")),
            "default" => Ok(Self::Default),
            iri => Ok(Self::Named(iri.to_string())),
        }
    }
}

impl fmt::Display for GraphSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Named(iri) => f.write_str(iri),
        }
    }
}

/// One dataset document: the JSON-LD body plus its modification-time ledger.
///
/// Mutating methods change the in-memory document and bump the ledger;
/// [`DatasetDocument::update`] wraps them in a locked load/modify/save cycle.
#[derive(Debug, Clone)]
pub struct DatasetDocument {
    file: PathBuf,
    dataset_path: WorkspacePath,
    body: Value,
    ledger: MtimeLedger,
}

impl DatasetDocument {
    /// Create the document for `dataset` with an empty context, an empty
    /// default graph, and ledger entries for the dataset and its context.
    ///
    /// Fails with `NotFound` if the grapplication does not exist and with
    /// `AlreadyExists` if the document does.
    pub fn create(grapp_root: &Path, dataset: &WorkspacePath) -> DgrzResult<Self> {
        if !grapp_root.is_dir() {
            return Err(DgrzError::not_found("grapplication does not exist")
                .with_context("path", grapp_root.display()));
        }
        let file = document_path(grapp_root, dataset);
        if file.exists() {
            return Err(already_exists(dataset));
        }
        let dir = grapp_root.join(dataset.to_path_buf());
        fs::create_dir_all(&dir)?;

        dgrz_fs::directory_lock(&dir, || {
            if file.exists() {
                return Err(already_exists(dataset));
            }
            let mut ledger = MtimeLedger::new();
            ledger.touch(&Location::dataset(dataset.clone()).key());
            ledger.touch(&Location::dataset_context(dataset.clone()).key());
            let doc = Self {
                file: file.clone(),
                dataset_path: dataset.clone(),
                body: json!({ CONTEXT: {}, GRAPH: [] }),
                ledger,
            };
            doc.save()?;
            info!(dataset = %dataset, "dataset created");
            Ok(doc)
        })
    }

    /// Read the document for `dataset`. Fails with `NotFound` if absent.
    pub fn load(grapp_root: &Path, dataset: &WorkspacePath) -> DgrzResult<Self> {
        let file = document_path(grapp_root, dataset);
        let text = fs::read_to_string(&file).map_err(|e| {
            DgrzError::from(e)
                .with_context("dataset", dataset)
                .with_context("path", file.display())
        })?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| DgrzError::from(e).with_context("path", file.display()))?;
        Self::from_value(file, dataset.clone(), value)
    }

    /// Split a parsed document into body and ledger.
    pub fn from_value(file: PathBuf, dataset_path: WorkspacePath, value: Value) -> DgrzResult<Self> {
        let Value::Object(mut body) = value else {
            return Err(DgrzError::unexpected_type("dataset document is not a JSON object")
                .with_context("dataset", &dataset_path));
        };
        let ledger = match body.remove(LEDGER_KEY) {
            Some(value) => MtimeLedger::from_value(value)?,
            None => MtimeLedger::new(),
        };
        Ok(Self {
            file,
            dataset_path,
            body: Value::Object(body),
            ledger,
        })
    }

    /// Load, apply `edit`, and save, holding the dataset directory lock.
    pub fn update<T>(
        grapp_root: &Path,
        dataset: &WorkspacePath,
        edit: impl FnOnce(&mut Self) -> DgrzResult<T>,
    ) -> DgrzResult<T> {
        let dir = grapp_root.join(dataset.to_path_buf());
        if !dir.is_dir() {
            return Err(DgrzError::not_found("dataset does not exist").with_context("dataset", dataset));
        }
        dgrz_fs::directory_lock(&dir, || {
            let mut doc = Self::load(grapp_root, dataset)?;
            let out = edit(&mut doc)?;
            doc.save()?;
            Ok(out)
        })
    }

    /// The full document, ledger included, as written to disk.
    pub fn to_value(&self) -> Value {
        let mut map = match &self.body {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        map.insert(LEDGER_KEY.to_string(), self.ledger.to_value());
        Value::Object(map)
    }

    /// Write the document through the atomic writer.
    pub fn save(&self) -> DgrzResult<()> {
        let value = self.to_value();
        dgrz_fs::write_atomic(&self.file, |w| {
            serde_json::to_writer_pretty(&mut *w, &value)?;
            w.write_all(b"\n")?;
            Ok(())
        })?;
        debug!(dataset = %self.dataset_path, "dataset document saved");
        Ok(())
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn dataset_path(&self) -> &WorkspacePath {
        &self.dataset_path
    }

    /// The JSON-LD body, without the ledger.
    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn ledger(&self) -> &MtimeLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut MtimeLedger {
        &mut self.ledger
    }

    /// Borrow the body mutably alongside the ledger.
    pub fn split_mut(&mut self) -> (&mut Value, &mut MtimeLedger) {
        (&mut self.body, &mut self.ledger)
    }

    /// Walk the body with `visitor`.
    pub fn walk(&mut self, visitor: &mut dyn Visitor) -> DgrzResult<()> {
        walker::walk(&self.dataset_path, &mut self.body, visitor)
    }

    /// Every addressable sub-resource, in walk order.
    pub fn locations(&mut self) -> DgrzResult<Vec<Location>> {
        let mut collector = Collector::default();
        self.walk(&mut collector)?;
        Ok(collector.locations)
    }

    /// Add `term -> iri` to the dataset-level `@context`.
    pub fn add_namespace(&mut self, term: &str, iri: &str) -> DgrzResult<()> {
        check_term(term, iri)?;
        let Some(body) = self.body.as_object_mut() else {
            return Err(DgrzError::unexpected_type("dataset document is not a JSON object"));
        };
        let context = body.entry(CONTEXT).or_insert_with(|| json!({}));
        insert_term(context, term, iri)?;

        self.ledger.touch(&Location::dataset_context(self.dataset_path.clone()).key());
        self.touch_dataset();
        Ok(())
    }

    /// Add `term -> iri` to the `@context` of the node identified by
    /// `node_iri`, creating the context if needed.
    pub fn add_node_namespace(&mut self, node_iri: &str, term: &str, iri: &str) -> DgrzResult<()> {
        check_term(term, iri)?;
        let mut editor = NodeContextEditor {
            node_iri,
            term,
            iri,
            found: None,
        };
        self.walk(&mut editor)?;
        let Some(location) = editor.found else {
            return Err(DgrzError::not_found("node does not exist")
                .with_context("dataset", &self.dataset_path)
                .with_context("node", node_iri));
        };
        self.ledger.touch(&location.key());
        self.touch_dataset();
        Ok(())
    }

    /// Append `node` to the selected graph, minting a blank-node `@id` when
    /// it has none. Returns the new node's location.
    pub fn append_node(&mut self, graph: &GraphSelector, mut node: Value) -> DgrzResult<Location> {
        let Some(map) = node.as_object_mut() else {
            return Err(DgrzError::unexpected_type("node must be a JSON object"));
        };
        if !walker::is_node_object(map, 1, false) {
            return Err(DgrzError::unexpected_value("value is not a JSON-LD node object"));
        }
        let id = match map.get(ID) {
            None => {
                let id = mint_blank_node_id();
                map.insert(ID.to_string(), Value::String(id.clone()));
                id
            }
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(other) => {
                return Err(DgrzError::unexpected_type("@id must be a non-empty string")
                    .with_context("id", other))
            }
        };

        let container = self.graph_container(graph)?;
        let location = Location::new(
            self.dataset_path.clone(),
            ResourceKind::Node,
            id,
            container.object_kind(),
            container.object_iri(),
        )?;
        if self.locations()?.contains(&location) {
            return Err(DgrzError::already_exists("node already exists in graph")
                .with_context("node", location.object_iri())
                .with_context("graph", graph));
        }
        self.push_member(graph, node)?;

        self.ledger.touch(&location.key());
        self.touch_container(&container);
        debug!(location = %location, "node appended");
        Ok(location)
    }

    /// Append a named graph `{"@id": iri, "@graph": []}` to the selected
    /// parent graph. Fails with `AlreadyExists` if any graph or node in the
    /// document already uses `iri`.
    pub fn create_named_graph(&mut self, parent: &GraphSelector, iri: &str) -> DgrzResult<Location> {
        if iri.is_empty() {
            return Err(DgrzError::invalid_value("named graph IRI is empty"));
        }
        let taken = self.locations()?.iter().any(|l| {
            matches!(l.object_kind(), ResourceKind::Node | ResourceKind::NamedGraph)
                && l.object_iri() == iri
        });
        if taken {
            return Err(DgrzError::already_exists("IRI already used in dataset")
                .with_context("dataset", &self.dataset_path)
                .with_context("iri", iri));
        }

        let container = self.graph_container(parent)?;
        let location = Location::new(
            self.dataset_path.clone(),
            ResourceKind::NamedGraph,
            iri,
            container.object_kind(),
            container.object_iri(),
        )?;
        self.push_member(parent, json!({ ID: iri, GRAPH: [] }))?;

        self.ledger.touch(&location.key());
        self.touch_container(&container);
        debug!(location = %location, "named graph created");
        Ok(location)
    }

    /// Location of the resource that holds the selected graph.
    fn graph_container(&mut self, graph: &GraphSelector) -> DgrzResult<Location> {
        match graph {
            GraphSelector::Default => Ok(Location::dataset(self.dataset_path.clone())),
            GraphSelector::Named(iri) => self
                .locations()?
                .into_iter()
                .find(|l| l.object_kind() == ResourceKind::NamedGraph && l.object_iri() == iri)
                .ok_or_else(|| {
                    DgrzError::not_found("named graph does not exist")
                        .with_context("dataset", &self.dataset_path)
                        .with_context("graph", iri)
                }),
        }
    }

    fn push_member(&mut self, graph: &GraphSelector, member: Value) -> DgrzResult<()> {
        match graph {
            GraphSelector::Default => push_graph_member(&mut self.body, member),
            GraphSelector::Named(iri) => {
                let mut appender = GraphAppender {
                    graph_iri: iri,
                    member: Some(member),
                };
                self.walk(&mut appender)?;
                match appender.member {
                    None => Ok(()),
                    Some(_) => Err(DgrzError::not_found("named graph does not exist")
                        .with_context("graph", iri)),
                }
            }
        }
    }

    fn touch_container(&mut self, container: &Location) {
        if container.object_kind() != ResourceKind::Dataset {
            self.ledger.touch(&container.key());
        }
        self.touch_dataset();
    }

    fn touch_dataset(&mut self) {
        self.ledger.touch(&Location::dataset(self.dataset_path.clone()).key());
    }
}

fn already_exists(dataset: &WorkspacePath) -> DgrzError {
    DgrzError::already_exists("dataset already exists").with_context("dataset", dataset)
}

/// A fresh blank-node identifier, `_:<uuid>`.
pub fn mint_blank_node_id() -> String {
    format!("_:{}", uuid::Uuid::now_v7())
}

fn check_term(term: &str, iri: &str) -> DgrzResult<()> {
    if term.is_empty() || term.starts_with('@') {
        return Err(DgrzError::invalid_value("namespace term must be non-empty and not a keyword")
            .with_context("term", term));
    }
    if iri.is_empty() {
        return Err(DgrzError::invalid_value("namespace IRI is empty").with_context("term", term));
    }
    Ok(())
}

fn insert_term(context: &mut Value, term: &str, iri: &str) -> DgrzResult<()> {
    let Some(map) = context.as_object_mut() else {
        return Err(DgrzError::unexpected_type("@context is not a map").with_context("term", term));
    };
    if map.contains_key(term) {
        return Err(DgrzError::already_exists("namespace term already defined")
            .with_context("term", term));
    }
    map.insert(term.to_string(), Value::String(iri.to_string()));
    Ok(())
}

fn push_graph_member(holder: &mut Value, member: Value) -> DgrzResult<()> {
    let Some(map) = holder.as_object_mut() else {
        return Err(DgrzError::unexpected_type("graph holder is not a JSON object"));
    };
    let graph = map.entry(GRAPH).or_insert_with(|| json!([]));
    match graph {
        Value::Array(members) => members.push(member),
        Value::Object(_) => {
            let single = graph.take();
            *graph = json!([single, member]);
        }
        _ => return Err(DgrzError::unexpected_type("@graph is not a list")),
    }
    Ok(())
}

#[derive(Default)]
struct Collector {
    locations: Vec<Location>,
}

impl Visitor for Collector {
    fn enter(&mut self, _value: &mut Value, location: &Location) -> DgrzResult<()> {
        self.locations.push(location.clone());
        Ok(())
    }
}

struct NodeContextEditor<'a> {
    node_iri: &'a str,
    term: &'a str,
    iri: &'a str,
    found: Option<Location>,
}

impl Visitor for NodeContextEditor<'_> {
    fn enter(&mut self, value: &mut Value, location: &Location) -> DgrzResult<()> {
        if self.found.is_some()
            || location.object_kind() != ResourceKind::Node
            || location.object_iri() != self.node_iri
        {
            return Ok(());
        }
        let Some(map) = value.as_object_mut() else {
            return Ok(());
        };
        let context = map.entry(CONTEXT).or_insert_with(|| json!({}));
        insert_term(context, self.term, self.iri)?;
        self.found = Some(location.clone());
        Ok(())
    }
}

/// Pushes `member` into the first named graph with the given IRI, after its
/// existing members have been walked.
struct GraphAppender<'a> {
    graph_iri: &'a str,
    member: Option<Value>,
}

impl Visitor for GraphAppender<'_> {
    fn enter(&mut self, _value: &mut Value, _location: &Location) -> DgrzResult<()> {
        Ok(())
    }

    fn exit(&mut self, value: &mut Value, location: &Location) -> DgrzResult<()> {
        if location.object_kind() == ResourceKind::NamedGraph && location.object_iri() == self.graph_iri {
            if let Some(member) = self.member.take() {
                push_graph_member(value, member)?;
            }
        }
        Ok(())
    }
}
