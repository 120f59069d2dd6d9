use std::{
    io::{BufRead, Write},
    path::Path,
    str::FromStr,
};

use crate::{
    category::Category,
    error::{Error, Result},
    index::DocumentIndex,
    ingestion::{self, ImportOptions},
    refiner::QueryRefiner,
    search,
    store::IndexStore,
    workflow::{self, RefineOptions},
};

const HELP: &str = "\
Commands:
  search <keywords>       keyword search over all documents
  import <path> [type]    import a file (type: financial, product, press, other)
  stats                   document counts per category
  norag <query>           refine a query without document context
  <query>                 refine a query using matching documents as context
  help                    show this help
  exit | quit             leave";

/// One parsed line of interactive input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    Empty,
    Exit,
    Help,
    Stats,
    Search(&'a str),
    Import {
        path: &'a str,
        category: Option<&'a str>,
    },
    RefineWithoutContext(&'a str),
    Refine(&'a str),
}

impl<'a> Line<'a> {
    pub fn parse(input: &'a str) -> Self {
        let input = input.trim();
        if input.is_empty() {
            return Line::Empty;
        }

        let (head, rest) = match input.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (input, ""),
        };

        match head.to_lowercase().as_str() {
            "exit" | "quit" if rest.is_empty() => Line::Exit,
            "help" if rest.is_empty() => Line::Help,
            "stats" if rest.is_empty() => Line::Stats,
            "search" => Line::Search(rest),
            "import" => {
                let mut parts = rest.rsplitn(2, char::is_whitespace);
                let last = parts.next().unwrap_or_default();
                match parts.next() {
                    Some(path) if Category::from_str(last).is_ok() => {
                        Line::Import {
                            path: path.trim(),
                            category: Some(last),
                        }
                    }
                    _ => Line::Import {
                        path: rest,
                        category: None,
                    },
                }
            }
            "norag" => Line::RefineWithoutContext(rest),
            _ => Line::Refine(input),
        }
    }
}

/// Read-eval loop over `input`, writing to `output`.
///
/// Errors from individual commands are printed and the loop goes on; only
/// I/O errors on `output` end it early. End of input ends the loop.
pub fn run<S, I, O>(
    index: &mut DocumentIndex<S>,
    refiner: Option<&dyn QueryRefiner>,
    input: I,
    output: &mut O,
) -> Result<()>
where
    S: IndexStore,
    I: BufRead,
    O: Write,
{
    writeln!(output, "docrefine interactive mode. Type 'help' for commands.")?;
    let mut lines = input.lines();

    loop {
        write!(output, "> ")?;
        output.flush()?;

        let Some(line) = lines.next() else {
            writeln!(output)?;
            break;
        };
        let line = line?;

        let parsed = Line::parse(&line);
        if parsed == Line::Exit {
            break;
        }
        if let Err(e) = dispatch(index, refiner, parsed, output) {
            tracing::debug!("interactive command failed: {e:?}");
            writeln!(output, "Error: {e}")?;
        }
    }

    writeln!(output, "Goodbye.")?;
    Ok(())
}

fn dispatch<S: IndexStore, O: Write>(
    index: &mut DocumentIndex<S>,
    refiner: Option<&dyn QueryRefiner>,
    line: Line<'_>,
    output: &mut O,
) -> Result<()> {
    match line {
        Line::Empty | Line::Exit => {}
        Line::Help => writeln!(output, "{HELP}")?,
        Line::Stats => {
            let stats = index.stats();
            writeln!(output, "Total documents: {}", stats.total)?;
            for (category, count) in &stats.by_category {
                writeln!(output, "  {category}: {count}")?;
            }
        }
        Line::Search(keywords) => {
            if keywords.is_empty() {
                return Err(Error::InvalidInput(
                    "usage: search <keywords>".into(),
                ));
            }
            let hits =
                search::search(index, keywords, None, search::DEFAULT_LIMIT);
            if hits.is_empty() {
                writeln!(output, "No matching documents found.")?;
            }
            for hit in &hits {
                writeln!(
                    output,
                    "{:>3}. [{}] {} ({})",
                    hit.rank, hit.score, hit.id, hit.category
                )?;
            }
        }
        Line::Import { path, category } => {
            if path.is_empty() {
                return Err(Error::InvalidInput(
                    "usage: import <path> [type]".into(),
                ));
            }
            let options = ImportOptions {
                category: category.map(Category::from_str).transpose()?,
                ..ImportOptions::default()
            };
            let id = ingestion::import_file(index, Path::new(path), options)?;
            writeln!(output, "Imported {path} as {id}")?;
        }
        Line::RefineWithoutContext(query) | Line::Refine(query) => {
            if query.is_empty() {
                return Err(Error::InvalidInput("query is empty".into()));
            }
            let Some(refiner) = refiner else {
                return Err(Error::Config(
                    "query refinement is unavailable (is GEMINI_API_KEY set?)"
                        .into(),
                ));
            };
            let options = RefineOptions {
                use_context: matches!(line, Line::Refine(_)),
                ..RefineOptions::default()
            };
            let outcome =
                workflow::refine_query(index, refiner, query, options)?;
            writeln!(output, "Refined query: {}", outcome.refined_query)?;
            writeln!(
                output,
                "({} context, {:.2}s)",
                if outcome.used_context { "with" } else { "without" },
                outcome.elapsed.as_secs_f64()
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_dir::DataDir,
        record::Attributes,
        refiner::{RefineRequest, RefinedQuery},
        store::MemoryStore,
    };

    struct UpperRefiner;

    impl QueryRefiner for UpperRefiner {
        fn refine(&self, request: &RefineRequest) -> Result<RefinedQuery> {
            Ok(RefinedQuery {
                refined_query: format!(
                    "{} [{} ctx]",
                    request.raw_query.to_uppercase(),
                    request.context_snippets.len()
                ),
            })
        }
    }

    fn test_index() -> (tempfile::TempDir, DocumentIndex<MemoryStore>) {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = DataDir::at(tmp.path().join("data")).unwrap();
        let mut index =
            DocumentIndex::with_store(data_dir, MemoryStore::new()).unwrap();
        index
            .add(
                "Annual Recurring Revenue (ARR): $1.7 billion",
                Category::Financial,
                Attributes::new(),
                Some("fin-q3"),
            )
            .unwrap();
        (tmp, index)
    }

    fn session(
        index: &mut DocumentIndex<MemoryStore>,
        refiner: Option<&dyn QueryRefiner>,
        script: &str,
    ) -> String {
        let mut out = Vec::new();
        run(index, refiner, script.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn parse_commands() {
        assert_eq!(Line::parse("  "), Line::Empty);
        assert_eq!(Line::parse("QUIT"), Line::Exit);
        assert_eq!(
            Line::parse("search ARR growth"),
            Line::Search("ARR growth")
        );
        assert_eq!(
            Line::parse("import reports/q3 notes.txt financial"),
            Line::Import {
                path: "reports/q3 notes.txt",
                category: Some("financial"),
            }
        );
        assert_eq!(
            Line::parse("import q3.txt"),
            Line::Import {
                path: "q3.txt",
                category: None,
            }
        );
        assert_eq!(
            Line::parse("norag HPE ARR"),
            Line::RefineWithoutContext("HPE ARR")
        );
        assert_eq!(
            Line::parse("what is HPE ARR"),
            Line::Refine("what is HPE ARR")
        );
        assert_eq!(Line::parse("stats please"), Line::Refine("stats please"));
    }

    #[test]
    fn stats_and_search() {
        let (_tmp, mut index) = test_index();
        let out = session(&mut index, None, "stats\nsearch arr\nexit\n");

        assert!(out.contains("Total documents: 1"));
        assert!(out.contains("financial: 1"));
        assert!(out.contains("fin-q3 (financial)"));
        assert!(out.ends_with("Goodbye.\n"));
    }

    #[test]
    fn refine_with_and_without_context() {
        let (_tmp, mut index) = test_index();
        let out = session(
            &mut index,
            Some(&UpperRefiner),
            "arr\nnorag arr\n",
        );

        assert!(out.contains("Refined query: ARR [1 ctx]"));
        assert!(out.contains("Refined query: ARR [0 ctx]"));
    }

    #[test]
    fn errors_do_not_end_the_loop() {
        let (_tmp, mut index) = test_index();
        let out = session(
            &mut index,
            None,
            "import /no/such/file.txt\nsome query\nstats\n",
        );

        assert_eq!(out.matches("Error:").count(), 2);
        assert!(out.contains("Total documents: 1"));
    }

    #[test]
    fn import_adds_document() {
        let (tmp, mut index) = test_index();
        let file = tmp.path().join("launch.txt");
        std::fs::write(&file, "HPE today announced a new platform").unwrap();

        let out = session(
            &mut index,
            None,
            &format!("import {} press\n", file.display()),
        );

        assert!(out.contains("Imported"));
        assert_eq!(index.list_by_category(Category::Press).len(), 1);
    }

    #[test]
    fn eof_ends_session() {
        let (_tmp, mut index) = test_index();
        let out = session(&mut index, None, "help");
        assert!(out.contains("exit | quit"));
        assert!(out.ends_with("Goodbye.\n"));
    }
}
