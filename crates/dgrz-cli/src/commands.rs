use colored::Colorize;
use dgrz_sdk::config::KEYS;
use dgrz_sdk::{CancelToken, ChangeKind, Grapplication, GraphSelector, Home, Location};
use dgrz_types::DgrzError;
use serde_json::Value;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let home = Home::from_env()?;
    run_in(home, cli)
}

pub fn run_in(mut home: Home, cli: Cli) -> anyhow::Result<()> {
    let grapp = cli.grapp.as_deref();
    match cli.command {
        Command::Init(args) => cmd_init(&home, args),
        Command::Config(args) => cmd_config(&mut home, args),
        Command::Create(cmd) => cmd_create(&home.grapplication(grapp)?, cmd),
        Command::Insert(args) => cmd_insert(&home.grapplication(grapp)?, args),
        Command::Alter(cmd) => cmd_alter(&home.grapplication(grapp)?, cmd),
        Command::Add(args) => cmd_add(&home.grapplication(grapp)?, args),
        Command::Rm(args) => cmd_rm(&home.grapplication(grapp)?, args),
        Command::Status(args) => cmd_status(&home.grapplication(grapp)?, args),
        Command::Snapshot(_) => cmd_snapshot(&home.grapplication(grapp)?),
        Command::Get(args) => cmd_get(&home.grapplication(grapp)?, args),
        Command::Validate(args) => cmd_validate(&home.grapplication(grapp)?, args),
        Command::Port(args) => {
            println!("{}", home.grapplication(grapp)?.next_port(args.base)?);
            Ok(())
        }
    }
}

fn cmd_init(home: &Home, args: InitArgs) -> anyhow::Result<()> {
    let grapp = home.init_grapplication(&args.name)?;
    println!("{} Initialized grapplication {} in {}", "✓".green().bold(), args.name.bold(), grapp.root().display());
    println!("  Branch: {}", home.config().default_branch.yellow());
    println!("  Object store: {}", grapp.store().backend_name().cyan());
    Ok(())
}

fn cmd_config(home: &mut Home, args: ConfigArgs) -> anyhow::Result<()> {
    match (&args.key, &args.value) {
        (Some(key), Some(value)) => {
            home.config_mut().set(key, value)?;
            home.save_config()?;
            println!("Set {} = {}", key.bold(), value);
        }
        (Some(key), None) => println!("{}", home.config().get(key)?),
        _ => {
            for key in KEYS {
                println!("{} = {}", key.bold(), home.config().get(key)?);
            }
        }
    }
    Ok(())
}

fn cmd_create(grapp: &Grapplication, cmd: CreateCommand) -> anyhow::Result<()> {
    match cmd {
        CreateCommand::Dataset { path } => {
            grapp.create_dataset(&path)?;
            println!("{} Created dataset {}", "✓".green().bold(), path.to_string().bold());
        }
        CreateCommand::Graph { dataset, iri, graph } => {
            let parent: GraphSelector = graph.parse()?;
            grapp.create_graph(&dataset, &parent, &iri)?;
            println!("{} Created graph {} in {} ({})", "✓".green().bold(), iri.cyan(), dataset.to_string().bold(), parent);
        }
    }
    Ok(())
}

fn cmd_insert(grapp: &Grapplication, args: InsertArgs) -> anyhow::Result<()> {
    let graph: GraphSelector = args.graph.parse()?;
    let node: Value = serde_json::from_str(&args.node).map_err(DgrzError::from)?;
    let location = grapp.insert(&args.dataset, &graph, node)?;
    println!("{} Inserted {} into {} ({})", "✓".green().bold(), location.object_iri().cyan(), args.dataset.to_string().bold(), graph);
    Ok(())
}

fn cmd_alter(grapp: &Grapplication, cmd: AlterCommand) -> anyhow::Result<()> {
    match cmd {
        AlterCommand::Namespace { dataset, term, iri, node } => {
            grapp.add_namespace(&dataset, &term, &iri, node.as_deref())?;
            let scope = node.unwrap_or_else(|| dataset.to_string());
            println!("{} Bound {} → {} in {}", "✓".green().bold(), term.bold(), iri.blue(), scope);
        }
    }
    Ok(())
}

fn location(args: &StageArgs) -> anyhow::Result<Location> {
    Ok(Location::new(
        args.dataset.clone(),
        args.kind,
        args.iri.as_str(),
        args.container_kind,
        args.container_iri.as_str(),
    )?)
}

fn cmd_add(grapp: &Grapplication, args: StageArgs) -> anyhow::Result<()> {
    let location = location(&args)?;
    let report = grapp.stage(&location, args.dry_run, &CancelToken::new())?;
    let verb = if args.dry_run { "Would stage" } else { "Staged" };
    println!("{} {} {}", "✓".green().bold(), verb, location.to_string().bold());
    println!(
        "  {} staged, {} unchanged, {} objects stored",
        report.staged.to_string().green(),
        report.unchanged,
        report.objects
    );
    Ok(())
}

fn cmd_rm(grapp: &Grapplication, args: StageArgs) -> anyhow::Result<()> {
    let location = location(&args)?;
    let removed = grapp.remove(&location, args.dry_run, &CancelToken::new())?;
    if removed.is_empty() {
        println!("Nothing staged at {}", location);
        return Ok(());
    }
    let label = if args.dry_run { "would remove:" } else { "removed:" };
    for entry in &removed {
        println!("  {} {}", label.red(), entry.location());
    }
    Ok(())
}

fn cmd_status(grapp: &Grapplication, args: StatusArgs) -> anyhow::Result<()> {
    let status = grapp.status()?;
    println!("On branch {}", status.branch.yellow().bold());
    match &status.snapshot {
        Some(root) => println!("Snapshot: {}", root.to_string().cyan()),
        None => println!("Snapshot: {}", "none".dimmed()),
    }
    println!("Committed entries: {}", status.entries.len().to_string().bold());
    if args.entries {
        for entry in &status.entries {
            let cid = entry.object_cid().map(|c| c.to_string()).unwrap_or_default();
            println!("  {} {}", entry.location(), cid.dimmed());
        }
    }

    if status.is_clean() {
        println!("\nWorking tree matches the index.");
        return Ok(());
    }
    println!();
    for change in &status.changes {
        let label = match change.kind {
            ChangeKind::Modified => "modified:".yellow(),
            ChangeKind::Untracked => "untracked:".green(),
            ChangeKind::Deleted => "deleted:".red(),
        };
        println!("  {} {}", label, change.location);
    }
    Ok(())
}

fn cmd_snapshot(grapp: &Grapplication) -> anyhow::Result<()> {
    let (branch, snapshot) = grapp.snapshot(&CancelToken::new())?;
    eprintln!("{} {} trees, {} leaves on {}", "✓".green().bold(), snapshot.trees, snapshot.leaves, branch.yellow());
    println!("{}", snapshot.root);
    Ok(())
}

fn cmd_get(grapp: &Grapplication, args: GetArgs) -> anyhow::Result<()> {
    let doc = grapp.document(&args.dataset)?;
    let value = if args.raw { doc.to_value() } else { doc.body().clone() };
    println!("{}", serde_json::to_string_pretty(&value).map_err(DgrzError::from)?);
    Ok(())
}

fn cmd_validate(grapp: &Grapplication, args: ValidateArgs) -> anyhow::Result<()> {
    let report = grapp.validate(&args.dataset)?;
    println!("{} resources, {} stageable", report.resources, report.stageable);
    if report.is_clean() {
        println!("{} No issues.", "✓".green().bold());
        return Ok(());
    }
    for finding in &report.findings {
        println!("  {} {}", "✗".red(), finding);
    }
    Err(DgrzError::unexpected_value("dataset document has findings")
        .with_context("dataset", &args.dataset)
        .with_context("findings", report.findings.len())
        .into())
}
