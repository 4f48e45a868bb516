//! Run orchestration
//!
//! Wires one complete counting run together: obtain the exit interval index
//! (cache or fetch), stream every configured log file through
//! parse → status filter → classify → count, then merge the finished counts
//! into the datafile. One sequential pass, no component feeding back into an
//! earlier one.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::accesslog::parse_combined;
use crate::classify::{classify, filter_status};
use crate::config::{Config, LogFormat, ParserConfig};
use crate::counter::Counter;
use crate::exits::{
    bake_descriptors, fetch_exit_list_archive, load_cache, load_exit_list_paths, store_cache,
    DescriptorReader, ExitDescriptor, ExitIntervalIndex,
};
use crate::month::Month;
use crate::report::{update_datafile, Meta};

/// Options resolved from the command line for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Month to process
    pub month: Month,
    /// Skip the cache and always fetch a fresh exit list
    pub force_fetch: bool,
    /// Datafile the results are merged into
    pub datafile: PathBuf,
    /// Log files overriding every parser's configured file set, if any
    pub logfiles: Vec<PathBuf>,
    /// Local exit-list files or directories; when non-empty the index is
    /// baked from these instead of the cache or a fetch
    pub exit_lists: Vec<PathBuf>,
    /// Assume this descriptor type for unannotated exit-list documents
    pub force_descriptor_type: Option<String>,
    /// Whether the meta block gets a last-updated stamp
    pub record_last_updated: bool,
}

/// Execute one counting run
pub fn run(options: &RunOptions, config: &Config) -> Result<()> {
    let index = obtain_index(options, config)?;
    let mut counter = Counter::new(options.month, &index);

    let patterns = config.compiled_patterns()?;
    for (parser, pattern) in config.parsers.iter().zip(&patterns) {
        let files = if options.logfiles.is_empty() {
            parser.files.clone()
        } else {
            options.logfiles.clone()
        };
        for path in &files {
            process_logfile(&mut counter, parser, pattern, path)?;
        }
    }

    let meta = Meta {
        title: config.title.clone(),
        comment: config.comment.clone(),
        source: config.source.clone(),
        record_last_updated: options.record_last_updated,
    };
    update_datafile(&options.datafile, options.month, &counter.stats(), &meta)
}

/// Build or load the compacted exit interval index for the scoped month
///
/// Local exit lists given on the command line win outright: the index is
/// baked from them and the cache rewritten. Otherwise, cache policy: with
/// `force_fetch` the archive is always fetched and the cache rewritten; a
/// cache load is attempted first and any load failure falls back to
/// fetch-and-bake. A fetch failure is a run failure.
fn obtain_index(options: &RunOptions, config: &Config) -> Result<ExitIntervalIndex> {
    let reader = DescriptorReader {
        force_descriptor_type: options.force_descriptor_type.clone(),
    };

    if !options.exit_lists.is_empty() {
        let descriptors = load_exit_list_paths(&options.exit_lists, &reader)
            .with_context(|| format!("building exit index for {}", options.month))?;
        return Ok(bake_index(options, config, &descriptors));
    }

    if !options.force_fetch {
        match load_cache(&config.cache_dir, options.month) {
            Ok(index) => return Ok(index),
            Err(err) => warn!(%err, "loading exit node list failed"),
        }
    }

    let descriptors = fetch_exit_list_archive(options.month, &reader)
        .with_context(|| format!("building exit index for {}", options.month))?;
    Ok(bake_index(options, config, &descriptors))
}

fn bake_index(
    options: &RunOptions,
    config: &Config,
    descriptors: &[ExitDescriptor],
) -> ExitIntervalIndex {
    let mut index = ExitIntervalIndex::new(config.tolerance_hours);
    let (n_desc, n_addr) = bake_descriptors(&mut index, descriptors);
    index.compact();
    info!(
        descriptors = n_desc,
        addresses = n_addr,
        "parsed exit node list"
    );

    if let Err(err) = store_cache(&config.cache_dir, options.month, &index) {
        // a failed cache write only costs the next run a re-fetch
        warn!(%err, "saving exit node cache failed");
    }
    index
}

/// Stream one log file into the counter
pub fn process_logfile(
    counter: &mut Counter<'_>,
    parser: &ParserConfig,
    pattern: &regex::Regex,
    path: &Path,
) -> Result<()> {
    match parser.format {
        LogFormat::Combined => {}
        // unreachable after config validation, kept as a hard error for
        // programmatic construction
        LogFormat::Haproxy => anyhow::bail!("haproxy log format is not implemented"),
    }

    info!(path = %path.display(), "parsing logfile");
    let file =
        File::open(path).with_context(|| format!("opening logfile {}", path.display()))?;
    let requests = parse_combined(BufReader::new(file));
    for record in classify(filter_status(requests), pattern) {
        counter.count(&record);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::ANY_LABEL;
    use regex::Regex;
    use std::io::Write;

    fn parser_config(files: Vec<PathBuf>) -> ParserConfig {
        ParserConfig {
            format: LogFormat::Combined,
            files,
            regexp_path: r"^/(?P<release>[^~/]+)/(.*/)?repomd\.xml(\.metalink)?$".to_string(),
        }
    }

    #[test]
    fn test_process_logfile_counts_matching_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"127.81.0.1 - - [01/Jul/2022:00:01:15 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml HTTP/1.1" 200 3859 "-" "libdnf""#
        )
        .unwrap();
        writeln!(
            file,
            r#"127.81.0.2 - - [01/Jul/2022:00:01:23 +0000] "GET /robots.txt HTTP/1.1" 200 10 "-" "bot""#
        )
        .unwrap();

        let index = ExitIntervalIndex::default();
        let mut counter = Counter::new("2022-07".parse().unwrap(), &index);
        let parser = parser_config(vec![file.path().to_path_buf()]);
        let pattern = Regex::new(&parser.regexp_path).unwrap();

        process_logfile(&mut counter, &parser, &pattern, file.path()).unwrap();

        let stats = counter.stats();
        assert_eq!(stats["r4.1"].plain, 1);
        assert_eq!(stats[ANY_LABEL].plain, 1);
        assert!(!stats.contains_key("robots.txt"));
    }

    #[test]
    fn test_missing_logfile_is_an_error() {
        let index = ExitIntervalIndex::default();
        let mut counter = Counter::new("2022-07".parse().unwrap(), &index);
        let parser = parser_config(vec![PathBuf::from("/nonexistent/access.log")]);
        let pattern = Regex::new(&parser.regexp_path).unwrap();
        assert!(process_logfile(
            &mut counter,
            &parser,
            &pattern,
            Path::new("/nonexistent/access.log")
        )
        .is_err());
    }

    #[test]
    fn test_obtain_index_bakes_local_exit_lists_and_caches() {
        use chrono::{TimeZone, Utc};

        let lists = tempfile::tempdir().unwrap();
        std::fs::write(
            lists.path().join("2022-07-01-00-02-00"),
            "\
@type tordnsel 1.0
ExitNode 0011BD2485AD45D984EC4159C88FC066E5E3300E
Published 2022-06-30 22:44:22
LastStatus 2022-07-01 02:00:00
ExitAddress 162.247.74.201 2022-07-01 02:10:19
",
        )
        .unwrap();
        let cache_dir = tempfile::tempdir().unwrap();

        let config = Config {
            title: "t".to_string(),
            comment: None,
            source: None,
            cache_dir: cache_dir.path().to_path_buf(),
            tolerance_hours: 24,
            parsers: vec![],
        };
        let options = RunOptions {
            month: "2022-07".parse().unwrap(),
            // even a forced fetch must not reach the network when local
            // lists are given
            force_fetch: true,
            datafile: PathBuf::from("unused.json"),
            logfiles: vec![],
            exit_lists: vec![lists.path().to_path_buf()],
            force_descriptor_type: None,
            record_last_updated: true,
        };

        let index = obtain_index(&options, &config).unwrap();
        let t = Utc
            .with_ymd_and_hms(2022, 7, 1, 1, 0, 0)
            .unwrap()
            .fixed_offset();
        assert!(index.query("162.247.74.201", &t));

        // the baked index lands in the cache, a later run can reuse it
        let cached = load_cache(cache_dir.path(), options.month).unwrap();
        assert!(cached.query("162.247.74.201", &t));
    }

    #[test]
    fn test_haproxy_format_is_rejected() {
        let index = ExitIntervalIndex::default();
        let mut counter = Counter::new("2022-07".parse().unwrap(), &index);
        let parser = ParserConfig {
            format: LogFormat::Haproxy,
            files: vec![],
            regexp_path: r"(?P<release>x)".to_string(),
        };
        let pattern = Regex::new(&parser.regexp_path).unwrap();
        assert!(
            process_logfile(&mut counter, &parser, &pattern, Path::new("/dev/null")).is_err()
        );
    }
}
