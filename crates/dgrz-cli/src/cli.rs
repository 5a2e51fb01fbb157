use clap::{Args, Parser, Subcommand};
use dgrz_types::{ResourceKind, WorkspacePath};

#[derive(Parser)]
#[command(
    name = "dgrz",
    about = "dogg3rz: stage and snapshot JSON-LD grapplications",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Grapplication to operate on (defaults to the configured one)
    #[arg(short, long, global = true)]
    pub grapp: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new grapplication
    Init(InitArgs),
    /// Get or set configuration
    Config(ConfigArgs),
    /// Create a dataset or a named graph
    #[command(subcommand)]
    Create(CreateCommand),
    /// Append a node to a dataset graph
    Insert(InsertArgs),
    /// Edit dataset contexts
    #[command(subcommand)]
    Alter(AlterCommand),
    /// Stage a resource and everything it contains
    Add(StageArgs),
    /// Remove a resource and everything it contains from the index
    Rm(StageArgs),
    /// Show staged entries and working-tree changes
    Status(StatusArgs),
    /// Snapshot the index and record the root on the current branch
    Snapshot(SnapshotArgs),
    /// Print a dataset document
    Get(GetArgs),
    /// Check a dataset document's modification ledger
    Validate(ValidateArgs),
    /// Allocate the next port
    Port(PortArgs),
}

#[derive(Args)]
pub struct InitArgs {
    pub name: String,
}

#[derive(Args)]
pub struct ConfigArgs {
    pub key: Option<String>,
    pub value: Option<String>,
}

#[derive(Subcommand)]
pub enum CreateCommand {
    /// Create an empty dataset document
    Dataset { path: WorkspacePath },
    /// Create a named graph inside a dataset
    Graph {
        dataset: WorkspacePath,
        iri: String,
        /// Parent graph: `default` or a named graph IRI
        #[arg(long, default_value = "default")]
        graph: String,
    },
}

#[derive(Args)]
pub struct InsertArgs {
    pub dataset: WorkspacePath,
    /// Node object as JSON
    pub node: String,
    /// Target graph: `default` or a named graph IRI
    #[arg(long, default_value = "default")]
    pub graph: String,
}

#[derive(Subcommand)]
pub enum AlterCommand {
    /// Bind a term to a namespace IRI
    Namespace {
        dataset: WorkspacePath,
        term: String,
        iri: String,
        /// Bind in this node's scoped context instead of the dataset's
        #[arg(long)]
        node: Option<String>,
    },
}

/// A location: the resource and its immediate container.
#[derive(Args)]
pub struct StageArgs {
    pub dataset: WorkspacePath,
    #[arg(long, default_value = "dataset")]
    pub kind: ResourceKind,
    #[arg(long, default_value = "")]
    pub iri: String,
    #[arg(long, default_value = "dataset")]
    pub container_kind: ResourceKind,
    #[arg(long, default_value = "")]
    pub container_iri: String,
    /// Show what would change and roll back
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Also list committed entries
    #[arg(long)]
    pub entries: bool,
}

#[derive(Args)]
pub struct SnapshotArgs {}

#[derive(Args)]
pub struct GetArgs {
    pub dataset: WorkspacePath,
    /// Include the modification ledger
    #[arg(long)]
    pub raw: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    pub dataset: WorkspacePath,
}

#[derive(Args)]
pub struct PortArgs {
    #[arg(long)]
    pub base: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["dgrz", "init", "demo"]).unwrap();
        if let Command::Init(args) = cli.command {
            assert_eq!(args.name, "demo");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_create_graph() {
        let cli = Cli::try_parse_from(["dgrz", "create", "graph", "people", "urn:g", "--graph", "urn:p"]).unwrap();
        if let Command::Create(CreateCommand::Graph { dataset, iri, graph }) = cli.command {
            assert_eq!(dataset.to_string(), "people");
            assert_eq!(iri, "urn:g");
            assert_eq!(graph, "urn:p");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_add_node() {
        let cli = Cli::try_parse_from([
            "dgrz", "add", "people", "--kind", "node", "--iri", "urn:alice", "--dry-run",
        ])
        .unwrap();
        if let Command::Add(args) = cli.command {
            assert_eq!(args.kind, ResourceKind::Node);
            assert_eq!(args.iri, "urn:alice");
            assert_eq!(args.container_kind, ResourceKind::Dataset);
            assert!(args.dry_run);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_rm_defaults_to_dataset() {
        let cli = Cli::try_parse_from(["dgrz", "rm", "a/b"]).unwrap();
        if let Command::Rm(args) = cli.command {
            assert_eq!(args.kind, ResourceKind::Dataset);
            assert_eq!(args.dataset.element_count(), 2);
            assert!(!args.dry_run);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn rejects_bad_path_and_kind() {
        assert!(Cli::try_parse_from(["dgrz", "get", "a/$b"]).is_err());
        assert!(Cli::try_parse_from(["dgrz", "add", "d", "--kind", "blob"]).is_err());
    }

    #[test]
    fn parse_alter_namespace() {
        let cli = Cli::try_parse_from([
            "dgrz", "alter", "namespace", "d", "foaf", "http://xmlns.com/foaf/0.1/", "--node", "urn:n",
        ])
        .unwrap();
        if let Command::Alter(AlterCommand::Namespace { term, node, .. }) = cli.command {
            assert_eq!(term, "foaf");
            assert_eq!(node.as_deref(), Some("urn:n"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_globals() {
        let cli = Cli::try_parse_from(["dgrz", "--verbose", "status", "--grapp", "demo"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.grapp.as_deref(), Some("demo"));
    }

    #[test]
    fn parse_port_base() {
        let cli = Cli::try_parse_from(["dgrz", "port", "--base", "20000"]).unwrap();
        if let Command::Port(args) = cli.command {
            assert_eq!(args.base, Some(20000));
        } else { panic!("wrong command"); }
    }
}
