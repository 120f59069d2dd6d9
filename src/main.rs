use std::{io, time::Duration};

use clap::Parser;
use docrefine::{
    Category,
    batch,
    ConfigDb,
    DataDir,
    DocumentIndex,
    GeminiRefiner,
    JsonFileStore,
    QueryRefiner,
    error::{self, Error},
    ingestion::{self, ImportOptions},
    interactive,
    record::{self, DocumentRecord, describe_attributes},
    repair,
    search,
    settings::{self, MODEL_SETTING, ModelResolution},
    text_util,
    workflow::{self, RefineOptions},
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, ConfigAction, ModelAction, QueryArgs};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCREFINE_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    // Secrets may live in a local .env; a missing file is fine.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Some(Command::Completions(args)) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let model = cli.model.as_deref();

    match cli.command.unwrap_or(Command::Interactive) {
        Command::Import(args) => {
            let mut index = DocumentIndex::open(&data_dir)?;
            let options = ImportOptions {
                category: args.category,
                attributes: record::parse_attributes(&args.metadata)?,
                id: args.id,
            };
            let id = ingestion::import_file(&mut index, &args.file, options)?;
            print_added(&index, &id);
        }
        Command::ImportDir(args) => {
            cmd_import_dir(&data_dir, &args)?;
        }
        Command::Add(args) => {
            let mut index = DocumentIndex::open(&data_dir)?;
            let attributes = record::parse_attributes(&args.metadata)?;
            let id = index.add(
                &args.text,
                args.category,
                attributes,
                args.id.as_deref(),
            )?;
            print_added(&index, &id);
        }
        Command::Show(args) => {
            let index = DocumentIndex::open(&data_dir)?;
            cmd_show(&index, &args)?;
        }
        Command::Tag { id, attributes } => {
            let mut index = DocumentIndex::open(&data_dir)?;
            let attributes = record::parse_attributes(&attributes)?;
            let record = index.amend(&id, attributes)?;
            println!("{id}: {}", describe_attributes(&record.attributes));
        }
        Command::Delete { id } => {
            let mut index = DocumentIndex::open(&data_dir)?;
            if !index.delete(&id)? {
                return Err(Error::NotFound {
                    kind: "document",
                    name: id,
                });
            }
            println!("Deleted {id}");
        }
        Command::List(args) => {
            let index = DocumentIndex::open(&data_dir)?;
            cmd_list(&index, args.category, args.json)?;
        }
        Command::Search(args) => {
            let index = DocumentIndex::open(&data_dir)?;
            let hits =
                search::search(&index, &args.query, args.category, args.count);
            if args.json {
                search::format_json(&hits, &args.query)?;
            } else {
                search::format_human(&hits, &args.query);
            }
        }
        Command::Stats { json } => {
            let index = DocumentIndex::open(&data_dir)?;
            cmd_stats(&index, &data_dir, json)?;
        }
        Command::Query(args) => {
            cmd_query(&data_dir, model, &args)?;
        }
        Command::Interactive => {
            let mut index = DocumentIndex::open(&data_dir)?;
            let config_db = ConfigDb::open(&data_dir.config_db())?;
            let refiner = settings::gemini_config(model, &config_db)
                .and_then(GeminiRefiner::new)
                .inspect_err(|e| {
                    tracing::warn!("query refinement disabled: {e}");
                })
                .ok();

            interactive::run(
                &mut index,
                refiner.as_ref().map(|r| r as &dyn QueryRefiner),
                io::stdin().lock(),
                &mut io::stdout(),
            )?;
        }
        Command::Repair(args) => {
            cmd_repair(&data_dir, args.dry_run, args.reset)?;
        }
        Command::Model { action } => {
            let config_db = ConfigDb::open(&data_dir.config_db())?;
            match action {
                ModelAction::Show { json } => {
                    let resolution =
                        settings::resolve_model(model, &config_db)?;
                    print_resolution(&resolution, json)?;
                }
                ModelAction::Set { model } => {
                    settings::store_setting(&config_db, MODEL_SETTING, &model)?;
                    println!("Model set to {model}");
                }
                ModelAction::Clear => {
                    if config_db.remove_setting(MODEL_SETTING)? {
                        println!("Cleared stored model setting");
                    } else {
                        println!("No stored model setting");
                    }
                }
            }
        }
        Command::Config { action } => {
            let config_db = ConfigDb::open(&data_dir.config_db())?;
            cmd_config(&config_db, action)?;
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn print_added(index: &DocumentIndex, id: &str) {
    match index.record(id) {
        Some(record) => println!("Added {id} ({})", record.category),
        None => println!("Added {id}"),
    }
}

fn record_json(record: &DocumentRecord) -> serde_json::Value {
    json!({
        "id": record.id,
        "path": record.path,
        "type": record.category,
        "added": record.added.to_rfc3339(),
        "metadata": record.attributes,
    })
}

fn cmd_show(index: &DocumentIndex, args: &cli::ShowArgs) -> error::Result<()> {
    let record = index.record(&args.id).ok_or_else(|| Error::NotFound {
        kind: "document",
        name: args.id.clone(),
    })?;

    if args.meta {
        println!("id: {}", record.id);
        println!("type: {}", record.category);
        println!("path: {}", record.path);
        println!("added: {}", record.added.to_rfc3339());
        for (key, value) in &record.attributes {
            match value {
                serde_json::Value::String(s) => println!("{key}: {s}"),
                other => println!("{key}: {other}"),
            }
        }
        return Ok(());
    }

    let content = docrefine::index::read_content(record)?;
    if args.json {
        let mut out = record_json(record);
        out["content"] = json!(content);
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let numbered;
    let text = if args.line_numbers {
        numbered = text_util::add_line_numbers(&content, 1);
        &numbered
    } else {
        &content
    };
    println!(
        "{}",
        text_util::apply_line_limits(text, args.from_line, args.max_lines)
    );
    Ok(())
}

fn cmd_list(
    index: &DocumentIndex,
    category: Option<Category>,
    json: bool,
) -> error::Result<()> {
    let records: Vec<&DocumentRecord> = match category {
        Some(category) => index.list_by_category(category),
        None => index.records().collect(),
    };

    if json {
        let out: Vec<_> = records.iter().map(|r| record_json(r)).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if records.is_empty() {
        println!("No documents.");
    } else {
        for record in &records {
            println!(
                "{}\t{}\t{}\t{}",
                record.id,
                record.category,
                record.added.format("%Y-%m-%d %H:%M"),
                describe_attributes(&record.attributes)
            );
        }
    }
    Ok(())
}

fn cmd_stats(
    index: &DocumentIndex,
    data_dir: &DataDir,
    json: bool,
) -> error::Result<()> {
    let stats = index.stats();

    if json {
        let out = json!({
            "data_dir": data_dir.root(),
            "total": stats.total,
            "by_category": stats.by_category,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Total documents: {}", stats.total);
        for (category, count) in &stats.by_category {
            println!("  {category}: {count}");
        }
    }
    Ok(())
}

fn cmd_repair(
    data_dir: &DataDir,
    dry_run: bool,
    reset: bool,
) -> error::Result<()> {
    let mut index = if reset {
        tracing::warn!("discarding the existing index and rebuilding it");
        let store = JsonFileStore::new(data_dir.index_file());
        DocumentIndex::empty(data_dir.clone(), store)
    } else {
        DocumentIndex::open(data_dir)?
    };

    let plan = repair::plan(data_dir, index.records())?;
    repair::format_plan(&plan);
    if dry_run {
        return Ok(());
    }
    if plan.is_clean() && !reset {
        return Ok(());
    }

    let report = repair::apply(&mut index, &plan)?;
    for (path, reason) in &report.failed {
        println!("failed  {}: {reason}", path.display());
    }
    println!(
        "Indexed {} orphan file(s), removed {} record(s)",
        report.indexed.len(),
        report.removed.len()
    );
    Ok(())
}

fn cmd_import_dir(
    data_dir: &DataDir,
    args: &cli::ImportDirArgs,
) -> error::Result<()> {
    if args.dry_run {
        let glob = args.glob.as_deref();
        let preview = ingestion::preview_dir(&args.dir, args.category, glob)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&preview)?);
            return Ok(());
        }
        for planned in &preview.planned {
            println!(
                "would import {} ({}) {}",
                planned.file.display(),
                planned.category,
                describe_attributes(&planned.attributes)
            );
        }
        for failed in &preview.failed {
            let file = failed.file.display();
            println!("would fail   {file}: {}", failed.reason);
        }
        println!(
            "\n{} to import, {} would fail (dry run, index unchanged)",
            preview.planned.len(),
            preview.failed.len()
        );
        return Ok(());
    }

    let mut index = DocumentIndex::open(data_dir)?;
    let report = ingestion::import_dir(
        &mut index,
        &args.dir,
        args.category,
        args.glob.as_deref(),
    )?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for file in &report.imported {
        println!(
            "imported {} -> {} ({})",
            file.file.display(),
            file.id,
            file.category
        );
    }
    for failed in &report.failed {
        let file = failed.file.display();
        println!("failed   {file}: {}", failed.reason);
    }
    println!(
        "\n{} imported, {} failed",
        report.imported.len(),
        report.failed.len()
    );
    Ok(())
}

fn cmd_query(
    data_dir: &DataDir,
    model: Option<&str>,
    args: &QueryArgs,
) -> error::Result<()> {
    let index = DocumentIndex::open(data_dir)?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;
    let config = settings::gemini_config(model, &config_db)?;
    let refiner = GeminiRefiner::new(config)?;
    let options = RefineOptions {
        use_context: !args.no_context,
        max_docs: args.max_docs,
    };

    let Some(batch_file) = &args.batch else {
        let query = args.query.as_deref().unwrap_or_default();
        let outcome = workflow::refine_query(&index, &refiner, query, options)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        } else {
            workflow::format_human(&outcome);
        }
        return Ok(());
    };

    let pause = Duration::try_from_secs_f64(args.pause).map_err(|e| {
        Error::InvalidInput(format!("invalid --pause {}: {e}", args.pause))
    })?;
    let queries = batch::read_queries(batch_file)?;
    if queries.is_empty() {
        return Err(Error::InvalidInput(format!(
            "no queries in {}",
            batch_file.display()
        )));
    }

    let entries = batch::run_batch(&index, &refiner, &queries, options, pause);
    let summary = batch::BatchSummary::from_entries(&entries);
    tracing::info!(
        total = summary.total,
        failed = summary.failed,
        "batch finished"
    );

    if args.json {
        let out = json!({
            "model": refiner.model(),
            "summary": summary,
            "results": entries,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let report = batch::render_report(
        &entries,
        refiner.model(),
        options.use_context,
        chrono::Utc::now(),
    );
    match &args.output {
        Some(path) => {
            std::fs::write(path, &report)?;
            println!(
                "{}/{} queries refined; report written to {}",
                summary.succeeded,
                summary.total,
                path.display()
            );
        }
        None => print!("{report}"),
    }
    Ok(())
}

fn print_resolution(
    resolution: &ModelResolution,
    json: bool,
) -> error::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(resolution)?);
    } else {
        println!("{} (from {})", resolution.model, resolution.source);
    }
    Ok(())
}

fn cmd_config(config_db: &ConfigDb, action: ConfigAction) -> error::Result<()> {
    match action {
        ConfigAction::List { json } => {
            let stored = config_db.list_settings()?;
            if json {
                let out: serde_json::Map<_, _> = stored
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else if stored.is_empty() {
                println!("No stored settings.");
            } else {
                for (key, value) in stored {
                    println!("{key} = {value}");
                }
            }
        }
        ConfigAction::Get { key } => {
            settings::validate_setting_key(&key)?;
            match config_db.get_setting(&key)? {
                Some(value) => println!("{value}"),
                None => {
                    return Err(Error::NotFound {
                        kind: "setting",
                        name: key,
                    });
                }
            }
        }
        ConfigAction::Set { key, value } => {
            settings::store_setting(config_db, &key, &value)?;
            println!("{key} set to {}", value.trim());
        }
        ConfigAction::Clear { key } => {
            settings::validate_setting_key(&key)?;
            if config_db.remove_setting(&key)? {
                println!("Cleared {key}");
            } else {
                println!("{key} was not set");
            }
        }
    }
    Ok(())
}
