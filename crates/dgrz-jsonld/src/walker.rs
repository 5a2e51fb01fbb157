//! Depth-first traversal of a dataset document.
//!
//! The walker classifies every map it meets as one of the four
//! [`ResourceKind`]s and hands the visitor a [`Location`] for each
//! addressable sub-resource, together with a mutable reference to the
//! sub-object itself. Maps that are neither graph objects nor node objects
//! (value objects, plain data inside a context) are not reported.
//!
//! Visiting order: a resource's `@context` comes before its members; graph
//! members are visited in sequence order; node properties in document key
//! order.

use dgrz_types::location::is_valid_combination;
use dgrz_types::{DgrzError, DgrzResult, Location, ResourceKind, WorkspacePath};
use serde_json::{Map, Value};
use tracing::trace;

pub const CONTEXT: &str = "@context";
pub const GRAPH: &str = "@graph";
pub const ID: &str = "@id";

/// Keys a graph object may carry besides `@graph`.
const GRAPH_OBJECT_KEYS: [&str; 4] = ["@graph", "@id", "@index", "@context"];
/// Keywords that make a map a value, list, or set object rather than a node.
const NON_NODE_KEYWORDS: [&str; 3] = ["@value", "@list", "@set"];

/// Callbacks invoked by [`walk`] for each addressable sub-resource.
pub trait Visitor {
    /// Called before the sub-resource's children are walked. Returning an
    /// error aborts the walk.
    fn enter(&mut self, value: &mut Value, location: &Location) -> DgrzResult<()>;

    /// Called after the children have been walked.
    fn exit(&mut self, _value: &mut Value, _location: &Location) -> DgrzResult<()> {
        Ok(())
    }
}

/// Walk `doc`, the body of the dataset document at `dataset_path`.
///
/// The document itself is reported as the `Dataset` resource. Fails with
/// `UnexpectedType` when the document is not a map, when `@graph` is not a
/// list, or when a graph or node carries a non-string `@id`.
pub fn walk(dataset_path: &WorkspacePath, doc: &mut Value, visitor: &mut dyn Visitor) -> DgrzResult<()> {
    if !doc.is_object() {
        return Err(DgrzError::unexpected_type("dataset document is not a JSON object")
            .with_context("dataset", dataset_path));
    }
    let mut walker = Walker {
        dataset_path,
        visitor,
        depth: 0,
        in_context: false,
    };
    walker.visit_dataset(doc)
}

/// Container of the sub-resources currently being walked.
#[derive(Clone)]
struct Container {
    kind: ResourceKind,
    iri: String,
}

struct Walker<'a> {
    dataset_path: &'a WorkspacePath,
    visitor: &'a mut dyn Visitor,
    /// Number of maps entered above the current one.
    depth: usize,
    /// True while below a `@context` key.
    in_context: bool,
}

impl Walker<'_> {
    fn location(&self, kind: ResourceKind, iri: &str, container: &Container) -> DgrzResult<Location> {
        Location::new(self.dataset_path.clone(), kind, iri, container.kind, container.iri.as_str())
    }

    fn visit_dataset(&mut self, doc: &mut Value) -> DgrzResult<()> {
        let location = Location::dataset(self.dataset_path.clone());
        self.visitor.enter(doc, &location)?;

        let here = Container {
            kind: ResourceKind::Dataset,
            iri: String::new(),
        };
        self.depth += 1;
        self.visit_members(doc, &here)?;
        self.depth -= 1;

        self.visitor.exit(doc, &location)
    }

    /// Walk the `@context` and `@graph` entries of a dataset or named graph.
    fn visit_members(&mut self, value: &mut Value, here: &Container) -> DgrzResult<()> {
        let Some(map) = value.as_object_mut() else {
            return Ok(());
        };
        if let Some(context) = map.get_mut(CONTEXT) {
            self.visit_context(context, here)?;
        }
        match map.get_mut(GRAPH) {
            None => Ok(()),
            Some(Value::Array(members)) => {
                for member in members.iter_mut() {
                    self.visit_value(member, here)?;
                }
                Ok(())
            }
            Some(other) => self.visit_value(other, here),
        }
    }

    fn visit_context(&mut self, context: &mut Value, container: &Container) -> DgrzResult<()> {
        match context {
            Value::Null => return Ok(()),
            Value::String(_) | Value::Object(_) | Value::Array(_) => {}
            _ => {
                return Err(DgrzError::unexpected_type("@context must be a string, map, or list")
                    .with_context("dataset", self.dataset_path)
                    .with_context("container", container.kind))
            }
        }
        if !is_valid_combination(ResourceKind::Context, container.kind) {
            return Ok(());
        }
        let location = self.location(ResourceKind::Context, "", container)?;
        self.visitor.enter(context, &location)?;

        let was_in_context = self.in_context;
        self.in_context = true;
        let here = Container {
            kind: ResourceKind::Context,
            iri: String::new(),
        };
        self.visit_scoped_contexts(context, &here)?;
        self.in_context = was_in_context;

        self.visitor.exit(context, &location)
    }

    /// Find contexts nested in term definitions of a context.
    fn visit_scoped_contexts(&mut self, value: &mut Value, here: &Container) -> DgrzResult<()> {
        match value {
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.visit_scoped_contexts(item, here)?;
                }
                Ok(())
            }
            Value::Object(map) => {
                self.depth += 1;
                for (key, child) in map.iter_mut() {
                    if key == CONTEXT {
                        self.visit_context(child, here)?;
                    } else if child.is_object() || child.is_array() {
                        self.visit_scoped_contexts(child, here)?;
                    }
                }
                self.depth -= 1;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Classify and walk an arbitrary value found below `container`.
    fn visit_value(&mut self, value: &mut Value, container: &Container) -> DgrzResult<()> {
        if let Value::Array(items) = value {
            for item in items.iter_mut() {
                self.visit_value(item, container)?;
            }
            return Ok(());
        }
        let (graph, node) = match value.as_object() {
            Some(map) => (
                is_graph_object(map, self.depth, self.in_context),
                is_node_object(map, self.depth, self.in_context),
            ),
            None => return Ok(()),
        };
        if graph {
            return self.visit_named_graph(value, container);
        }
        if node {
            return self.visit_node(value, container);
        }

        // Value, list, and set objects may still hold nodes.
        self.depth += 1;
        if let Some(map) = value.as_object_mut() {
            for (key, child) in map.iter_mut() {
                if key != "@value" && (child.is_object() || child.is_array()) {
                    self.visit_value(child, container)?;
                }
            }
        }
        self.depth -= 1;
        Ok(())
    }

    fn visit_named_graph(&mut self, value: &mut Value, container: &Container) -> DgrzResult<()> {
        let Some(iri) = self.id_of(value)? else {
            trace!(dataset = %self.dataset_path, "skipping graph object without @id");
            return Ok(());
        };
        if !is_valid_combination(ResourceKind::NamedGraph, container.kind) {
            trace!(dataset = %self.dataset_path, %iri, container = %container.kind, "skipping graph object");
            return Ok(());
        }
        let location = self.location(ResourceKind::NamedGraph, &iri, container)?;
        self.visitor.enter(value, &location)?;

        let here = Container {
            kind: ResourceKind::NamedGraph,
            iri,
        };
        self.depth += 1;
        self.visit_members(value, &here)?;
        self.depth -= 1;

        self.visitor.exit(value, &location)
    }

    fn visit_node(&mut self, value: &mut Value, container: &Container) -> DgrzResult<()> {
        let Some(iri) = self.id_of(value)? else {
            trace!(dataset = %self.dataset_path, "skipping node object without @id");
            return Ok(());
        };
        if !is_valid_combination(ResourceKind::Node, container.kind) {
            return Ok(());
        }
        let location = self.location(ResourceKind::Node, &iri, container)?;
        self.visitor.enter(value, &location)?;

        let here = Container {
            kind: ResourceKind::Node,
            iri,
        };
        self.depth += 1;
        if let Some(map) = value.as_object_mut() {
            if let Some(context) = map.get_mut(CONTEXT) {
                self.visit_context(context, &here)?;
            }
            for (key, child) in map.iter_mut() {
                if key == CONTEXT || key == ID {
                    continue;
                }
                if child.is_object() || child.is_array() {
                    self.visit_value(child, &here)?;
                }
            }
        }
        self.depth -= 1;

        self.visitor.exit(value, &location)
    }

    fn id_of(&self, value: &Value) -> DgrzResult<Option<String>> {
        match value.get(ID) {
            None => Ok(None),
            Some(Value::String(iri)) if !iri.is_empty() => Ok(Some(iri.clone())),
            Some(Value::String(_)) => Ok(None),
            Some(other) => Err(DgrzError::unexpected_type("@id must be a string")
                .with_context("dataset", self.dataset_path)
                .with_context("id", other)),
        }
    }
}

/// JSON-LD graph object: has `@graph`, sits below the top-most map and
/// outside any context, and carries nothing beyond `@graph`, `@id`,
/// `@index`, and `@context`.
pub fn is_graph_object(map: &Map<String, Value>, depth: usize, in_context: bool) -> bool {
    depth > 0
        && !in_context
        && map.contains_key(GRAPH)
        && map.keys().all(|k| GRAPH_OBJECT_KEYS.contains(&k.as_str()))
}

/// JSON-LD node object: outside any context, not the top-most map that holds
/// only `@graph` and `@context`, no value/list/set keyword, and not a graph
/// object.
pub fn is_node_object(map: &Map<String, Value>, depth: usize, in_context: bool) -> bool {
    if in_context {
        return false;
    }
    let top_level_wrapper =
        depth == 0 && map.keys().all(|k| k == GRAPH || k == CONTEXT);
    !top_level_wrapper
        && !NON_NODE_KEYWORDS.iter().any(|k| map.contains_key(*k))
        && !is_graph_object(map, depth, in_context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Records every enter/exit as `"+Kind<iri> in Kind<iri>"` strings.
    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    fn label(location: &Location) -> String {
        format!(
            "{}<{}> in {}<{}>",
            location.object_kind(),
            location.object_iri(),
            location.container_kind(),
            location.container_iri()
        )
    }

    impl Visitor for Recorder {
        fn enter(&mut self, _value: &mut Value, location: &Location) -> DgrzResult<()> {
            self.events.push(format!("+{}", label(location)));
            Ok(())
        }

        fn exit(&mut self, _value: &mut Value, location: &Location) -> DgrzResult<()> {
            self.events.push(format!("-{}", label(location)));
            Ok(())
        }
    }

    fn entered(doc: &mut Value) -> Vec<String> {
        let mut recorder = Recorder::default();
        walk(&WorkspacePath::parse("data1").unwrap(), doc, &mut recorder).unwrap();
        recorder
            .events
            .into_iter()
            .filter(|e| e.starts_with('+'))
            .map(|e| e[1..].to_string())
            .collect()
    }

    fn sample() -> Value {
        json!({
            "@context": {"schema": "http://schema.org/"},
            "@graph": [
                {"@id": "urn:mynode1", "schema:name": "one"},
                {
                    "@id": "urn:myNamedGraph",
                    "@context": {"ex": "http://example.org/"},
                    "@graph": [
                        {"@id": "urn:a", "schema:knows": {"@id": "urn:b"}},
                        {"@id": "urn:c", "schema:age": {"@value": 3}}
                    ]
                }
            ]
        })
    }

    #[test]
    fn classifies_all_kinds_in_order() {
        let events = entered(&mut sample());
        assert_eq!(
            events,
            vec![
                "Dataset<> in Dataset<>",
                "Context<> in Dataset<>",
                "Node<urn:mynode1> in Dataset<>",
                "NamedGraph<urn:myNamedGraph> in Dataset<>",
                "Context<> in NamedGraph<urn:myNamedGraph>",
                "Node<urn:a> in NamedGraph<urn:myNamedGraph>",
                "Node<urn:b> in Node<urn:a>",
                "Node<urn:c> in NamedGraph<urn:myNamedGraph>",
            ]
        );
    }

    #[test]
    fn enter_and_exit_are_balanced() {
        let mut recorder = Recorder::default();
        walk(&WorkspacePath::parse("d").unwrap(), &mut sample(), &mut recorder).unwrap();
        let enters = recorder.events.iter().filter(|e| e.starts_with('+')).count();
        let exits = recorder.events.iter().filter(|e| e.starts_with('-')).count();
        assert_eq!(enters, exits);
        assert_eq!(recorder.events.first().unwrap(), "+Dataset<> in Dataset<>");
        assert_eq!(recorder.events.last().unwrap(), "-Dataset<> in Dataset<>");
    }

    #[test]
    fn context_in_node_and_scoped_context() {
        let mut doc = json!({
            "@context": {"term": {"@id": "urn:t", "@context": {"x": "urn:x"}}},
            "@graph": [{"@id": "urn:n", "@context": "http://schema.org/"}]
        });
        let events = entered(&mut doc);
        assert_eq!(
            events,
            vec![
                "Dataset<> in Dataset<>",
                "Context<> in Dataset<>",
                "Context<> in Context<>",
                "Node<urn:n> in Dataset<>",
                "Context<> in Node<urn:n>",
            ]
        );
    }

    #[test]
    fn objects_without_id_are_skipped() {
        let mut doc = json!({
            "@graph": [
                {"schema:name": "anonymous", "schema:knows": {"@id": "urn:hidden"}},
                {"@graph": [{"@id": "urn:in-anonymous-graph"}]}
            ]
        });
        assert_eq!(entered(&mut doc), vec!["Dataset<> in Dataset<>"]);
    }

    #[test]
    fn non_string_graph_id_is_rejected() {
        let mut doc = json!({"@graph": [{"@id": ["urn:a", "urn:b"], "@graph": []}]});
        let err = walk(&WorkspacePath::parse("d").unwrap(), &mut doc, &mut Recorder::default())
            .unwrap_err();
        assert!(err.is(dgrz_types::ErrorKind::UnexpectedType));
    }

    #[test]
    fn non_object_document_is_rejected() {
        let mut doc = json!([1, 2]);
        let err = walk(&WorkspacePath::parse("d").unwrap(), &mut doc, &mut Recorder::default())
            .unwrap_err();
        assert!(err.is(dgrz_types::ErrorKind::UnexpectedType));
    }

    #[test]
    fn graph_object_predicate() {
        let map = |v: Value| v.as_object().unwrap().clone();
        assert!(is_graph_object(&map(json!({"@id": "g", "@graph": []})), 1, false));
        assert!(!is_graph_object(&map(json!({"@id": "g", "@graph": []})), 0, false));
        assert!(!is_graph_object(&map(json!({"@id": "g", "@graph": []})), 1, true));
        assert!(!is_graph_object(&map(json!({"@id": "g", "@graph": [], "p": 1})), 1, false));
    }

    #[test]
    fn node_object_predicate() {
        let map = |v: Value| v.as_object().unwrap().clone();
        assert!(is_node_object(&map(json!({"@id": "n"})), 1, false));
        assert!(!is_node_object(&map(json!({"@value": 1})), 1, false));
        assert!(!is_node_object(&map(json!({"@list": []})), 1, false));
        assert!(!is_node_object(&map(json!({"@id": "n"})), 1, true));
        assert!(!is_node_object(&map(json!({"@graph": [], "@context": {}})), 0, false));
        assert!(is_node_object(&map(json!({"@id": "n", "@graph": [], "p": 1})), 1, false));
    }

    #[test]
    fn visitor_can_mutate() {
        struct Tagger;
        impl Visitor for Tagger {
            fn enter(&mut self, value: &mut Value, location: &Location) -> DgrzResult<()> {
                if location.object_kind() == ResourceKind::Node {
                    value["seen"] = json!(true);
                }
                Ok(())
            }
        }
        let mut doc = sample();
        walk(&WorkspacePath::parse("d").unwrap(), &mut doc, &mut Tagger).unwrap();
        assert_eq!(doc["@graph"][0]["seen"], json!(true));
        assert_eq!(doc["@graph"][1]["@graph"][0]["schema:knows"]["seen"], json!(true));
    }
}
