//! End-to-end pipeline test: raw log text through to the exact datafile
//! bytes
//!
//! The log sample is a real-world slice (addresses rewritten into the
//! 127.81.0.0/16 documentation range) covering repeated requests, several
//! releases, dom0/vm variants and metalink paths.

use std::collections::BTreeMap;
use std::fs;

use regex::Regex;

use mirror_census::counter::{BucketStats, Counter};
use mirror_census::report::{update_datafile, Meta};
use mirror_census::{classify, filter_status, parse_combined, ExitIntervalIndex, Month};

const LOG: &str = r#"127.81.0.1 - - [01/Jul/2022:00:01:15 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml HTTP/1.1" 200 3859 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.1 - - [01/Jul/2022:00:01:16 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml.asc HTTP/1.1" 200 833 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.1 - - [01/Jul/2022:00:01:18 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml HTTP/1.1" 200 3859 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.1 - - [01/Jul/2022:00:01:19 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml.asc HTTP/1.1" 200 833 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.1 - - [01/Jul/2022:00:01:19 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml HTTP/1.1" 200 3859 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.1 - - [01/Jul/2022:00:01:20 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml.asc HTTP/1.1" 200 833 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.2 - - [01/Jul/2022:00:01:23 +0000] "GET /r4.1/current/vm/fc35/repodata/repomd.xml HTTP/1.1" 200 3853 "-" "libdnf (Fedora Linux 35; generic; Linux.x86_64)"
127.81.0.2 - - [01/Jul/2022:00:01:23 +0000] "GET /r4.1/current/vm/fc35/repodata/repomd.xml.asc HTTP/1.1" 200 833 "-" "libdnf (Fedora Linux 35; generic; Linux.x86_64)"
127.81.0.3 - - [01/Jul/2022:00:01:24 +0000] "GET /r4.0/current/vm/fc34/repodata/repomd.xml HTTP/1.1" 200 3853 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.4 - - [01/Jul/2022:00:01:44 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml HTTP/1.1" 200 3859 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.4 - - [01/Jul/2022:00:01:45 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml.asc HTTP/1.1" 200 833 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.4 - - [01/Jul/2022:00:01:46 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml HTTP/1.1" 200 3859 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.4 - - [01/Jul/2022:00:01:47 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml.asc HTTP/1.1" 200 833 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.5 - - [01/Jul/2022:00:01:47 +0000] "GET /r4.1/current/dom0/fc32/repodata/repomd.xml.metalink HTTP/1.1" 200 2809 "-" "libdnf (Fedora Linux 35; generic; Linux.x86_64)"
127.81.0.5 - - [01/Jul/2022:00:01:47 +0000] "GET /r4.1/unstable/dom0/fc32/repodata/repomd.xml.metalink HTTP/1.1" 200 2824 "-" "libdnf (Fedora Linux 35; generic; Linux.x86_64)"
127.81.0.4 - - [01/Jul/2022:00:01:54 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml HTTP/1.1" 200 3859 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.6 - - [01/Jul/2022:00:01:54 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml HTTP/1.1" 200 3859 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.4 - - [01/Jul/2022:00:01:55 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml.asc HTTP/1.1" 200 833 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.4 - - [01/Jul/2022:00:02:00 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml HTTP/1.1" 200 3859 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.4 - - [01/Jul/2022:00:02:01 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml.asc HTTP/1.1" 200 833 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.7 - - [01/Jul/2022:00:02:04 +0000] "GET /r4.0/current/dom0/fc25/repodata/repomd.xml.metalink HTTP/1.1" 200 2809 "-" "libdnf"
127.81.0.1 - - [01/Jul/2022:00:02:05 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml HTTP/1.1" 200 3859 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.1 - - [01/Jul/2022:00:02:07 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml.asc HTTP/1.1" 200 833 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.7 - - [01/Jul/2022:00:02:07 +0000] "GET /r4.0/templates-itl/repodata/repomd.xml.metalink HTTP/1.1" 200 2749 "-" "libdnf"
127.81.0.1 - - [01/Jul/2022:00:02:08 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml HTTP/1.1" 200 3859 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.1 - - [01/Jul/2022:00:02:09 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml.asc HTTP/1.1" 200 833 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.7 - - [01/Jul/2022:00:02:10 +0000] "GET /r4.0/templates-itl/repodata/repomd.xml HTTP/1.1" 200 3078 "-" "libdnf"
127.81.0.8 - - [01/Jul/2022:00:02:15 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml HTTP/1.1" 200 3859 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.8 - - [01/Jul/2022:00:02:15 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml.asc HTTP/1.1" 200 833 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.8 - - [01/Jul/2022:00:02:34 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml HTTP/1.1" 200 3859 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.8 - - [01/Jul/2022:00:02:34 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml.asc HTTP/1.1" 200 833 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.9 - - [01/Jul/2022:00:02:49 +0000] "GET /r4.1/current/vm/fc36/repodata/repomd.xml HTTP/1.1" 200 3852 "-" "libdnf (Fedora Linux 36; generic; Linux.x86_64)"
127.81.0.9 - - [01/Jul/2022:00:02:50 +0000] "GET /r4.1/current/vm/fc36/repodata/repomd.xml.asc HTTP/1.1" 200 833 "-" "libdnf (Fedora Linux 36; generic; Linux.x86_64)"
127.81.0.10 - - [01/Jul/2022:00:02:50 +0000] "GET /r4.0/current/vm/fc32/repodata/repomd.xml HTTP/1.1" 200 3853 "-" "libdnf (Fedora 32; generic; Linux.x86_64)"
127.81.0.1 - - [01/Jul/2022:00:02:55 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml HTTP/1.1" 200 3859 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.1 - - [01/Jul/2022:00:02:56 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml.asc HTTP/1.1" 200 833 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
127.81.0.1 - - [01/Jul/2022:00:02:57 +0000] "GET /r4.1/current/vm/fc34/repodata/repomd.xml HTTP/1.1" 200 3859 "-" "libdnf (Fedora 34; generic; Linux.x86_64)"
"#;

fn release_pattern() -> Regex {
    Regex::new(r"^/(?P<release>[^~/]+)/(.*/)?repomd\.xml(\.metalink)?$").unwrap()
}

fn count_log(log: &str) -> BTreeMap<String, BucketStats> {
    let index = ExitIntervalIndex::default();
    let month: Month = "2022-07".parse().unwrap();
    let mut counter = Counter::new(month, &index);

    let requests = parse_combined(log.as_bytes());
    for record in classify(filter_status(requests), &release_pattern()) {
        counter.count(&record);
    }
    counter.stats()
}

#[test]
fn test_monthly_stats_golden_output() {
    let stats = count_log(LOG);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stats.json");
    let meta = Meta {
        title: "Estimated Qubes OS userbase".to_string(),
        comment: None,
        source: None,
        record_last_updated: false,
    };
    update_datafile(&path, "2022-07".parse().unwrap(), &stats, &meta).unwrap();

    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        r#"{
  "2022-07": {
    "any": {
      "plain": 10,
      "tor": 0
    },
    "r4.0": {
      "plain": 3,
      "tor": 0
    },
    "r4.1": {
      "plain": 7,
      "tor": 0
    }
  },
  "meta": {
    "title": "Estimated Qubes OS userbase"
  }
}"#
    );
}

#[test]
fn test_asc_and_error_paths_do_not_count() {
    // .asc requests never match the pattern; unique counts come from the
    // repomd.xml and metalink hits alone
    let stats = count_log(LOG);
    assert_eq!(stats.len(), 3);
    assert_eq!(stats["any"], BucketStats { plain: 10, tor: 0 });
    assert_eq!(stats["r4.0"], BucketStats { plain: 3, tor: 0 });
    assert_eq!(stats["r4.1"], BucketStats { plain: 7, tor: 0 });
}

#[test]
fn test_relay_traffic_is_normalized_not_deduplicated() {
    use chrono::{TimeZone, Utc};

    let mut index = ExitIntervalIndex::default();
    index.register(
        "127.81.0.1",
        Utc.with_ymd_and_hms(2022, 6, 30, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2022, 8, 1, 0, 0, 0).unwrap(),
    );
    index.compact();

    let month: Month = "2022-07".parse().unwrap();
    let mut counter = Counter::new(month, &index);
    let requests = parse_combined(LOG.as_bytes());
    for record in classify(filter_status(requests), &release_pattern()) {
        counter.count(&record);
    }
    let stats = counter.stats();

    // 127.81.0.1 is an exit for the whole month: its 7 matching r4.1
    // requests move from plain to relay, leaving 6 plain users with 11
    // requests. Estimate: 7 * 6 / 11 = 3 (truncated).
    assert_eq!(stats["r4.1"], BucketStats { plain: 6, tor: 3 });
    // r4.0 saw no relay traffic
    assert_eq!(stats["r4.0"], BucketStats { plain: 3, tor: 0 });
}
