//! Command-line argument parsing.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};

use framesift_retrieval::ConditionSpec;
use framesift_store::Projection;

/// A parsed invocation.
#[derive(Debug)]
pub enum Command {
    Ingest { data_dir: Option<PathBuf> },
    Search { query: String, limit: Option<usize> },
    Objects { conditions: Vec<ConditionSpec>, projection: Option<Projection> },
    Stats,
    Help,
}

pub const USAGE: &str = "\
framesift: video keyframe retrieval

Usage: framesift <command>

Commands:
  ingest [data-dir]                      Rebuild both stores from clip-features/ and object-detection/
  search <text> [--limit N]              Keyframes closest to a text query
  objects '<json>' [--project f1,f2]     Keyframes matching object conditions, e.g.
                                         '[{\"label\":\"car\",\"confidence\":0.5,\"min_instances\":1}]'
  stats                                  Record counts of both stores
  help                                   Show this help message

Environment:
  FRAMESIFT_DATA_DIR, FRAMESIFT_EMBEDDING_DIM, FRAMESIFT_METRIC, FRAMESIFT_NPROBE,
  FRAMESIFT_SEARCH_LIMIT, FRAMESIFT_REINGEST, RUST_LOG";

/// Parse `args` (without the program name).
pub fn parse(args: &[String]) -> anyhow::Result<Command> {
    let Some(command) = args.first() else {
        return Ok(Command::Help);
    };
    let rest = &args[1..];

    match command.as_str() {
        "ingest" => Ok(Command::Ingest {
            data_dir: rest.first().map(PathBuf::from),
        }),
        "search" => {
            let (positional, limit) = take_option(rest, "--limit")?;
            let query = positional.join(" ");
            if query.trim().is_empty() {
                bail!("Usage: framesift search <text> [--limit N]");
            }
            let limit = limit
                .map(|raw| {
                    raw.parse::<usize>()
                        .with_context(|| format!("--limit expects a number, got '{}'", raw))
                })
                .transpose()?;
            Ok(Command::Search { query, limit })
        }
        "objects" => {
            let (positional, project) = take_option(rest, "--project")?;
            let raw = positional
                .first()
                .ok_or_else(|| anyhow!("Usage: framesift objects '<json>' [--project f1,f2]"))?;
            let conditions: Vec<ConditionSpec> =
                serde_json::from_str(raw).context("conditions must be a JSON array of objects")?;
            let projection = project.map(|fields| Projection::from_names(fields.split(',')));
            Ok(Command::Objects {
                conditions,
                projection,
            })
        }
        "stats" => Ok(Command::Stats),
        "--help" | "-h" | "help" => Ok(Command::Help),
        other => bail!("Unknown command: {}. Use 'framesift help' for usage.", other),
    }
}

/// Split `args` into positional arguments and the value of `flag`.
fn take_option<'a>(args: &'a [String], flag: &str) -> anyhow::Result<(Vec<&'a str>, Option<&'a str>)> {
    let mut positional = Vec::new();
    let mut value = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == flag {
            let v = iter
                .next()
                .ok_or_else(|| anyhow!("{} requires a value", flag))?;
            value = Some(v.as_str());
        } else {
            positional.push(arg.as_str());
        }
    }
    Ok((positional, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use framesift_store::DocumentField;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_args_is_help() {
        assert!(matches!(parse(&[]).unwrap(), Command::Help));
    }

    #[test]
    fn test_search_joins_words_and_reads_limit() {
        match parse(&args(&["search", "red", "car", "--limit", "5"])).unwrap() {
            Command::Search { query, limit } => {
                assert_eq!(query, "red car");
                assert_eq!(limit, Some(5));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse(&args(&["search", "car", "--limit", "many"])).is_err());
        assert!(parse(&args(&["search"])).is_err());
    }

    #[test]
    fn test_objects_parses_conditions_and_projection() {
        let cmd = parse(&args(&[
            "objects",
            r#"[{"label":"car","confidence":0.5,"min_instances":1,"max_instances":3}]"#,
            "--project",
            "video_id,keyframe_index",
        ]))
        .unwrap();
        match cmd {
            Command::Objects {
                conditions,
                projection,
            } => {
                assert_eq!(conditions.len(), 1);
                assert_eq!(conditions[0].max_instances, Some(3));
                assert_eq!(
                    projection.unwrap().fields(),
                    &[DocumentField::VideoId, DocumentField::FrameIndex]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse(&args(&["objects", "not json"])).is_err());
    }

    #[test]
    fn test_unknown_command() {
        assert!(parse(&args(&["serve"])).is_err());
    }
}
