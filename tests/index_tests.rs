use std::path::Path;

use shelfindex::config::{IndexConfig, IndexPaths};
use shelfindex::hash::{bucket_of, hash_key};
use shelfindex::index::FieldIndex;
use shelfindex::storage::buckets::BucketTable;
use shelfindex::storage::node_log::NodeLog;
use shelfindex::types::{Field, MatchMode};
use shelfindex::{build_all, build_index, Builder};
use tempfile::TempDir;

const SOURCE: &str = "Title,Author\nAlpha,Ann\nBeta,Bob\nAlpha,Cid\n";

// Row start offsets in SOURCE.
const ROW1: u64 = 13;
const ROW2: u64 = 23;
const ROW3: u64 = 32;

fn write_source(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("books.csv");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_end_to_end_scenario() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path(), SOURCE);
    let index_dir = dir.path().join("index");
    std::fs::create_dir_all(&index_dir).unwrap();

    let stats = build_index(&source, &index_dir, Field::Title, 4, 99).unwrap();
    assert_eq!(stats.rows_seen, 3);
    assert_eq!(stats.rows_indexed, 3);

    let index = FieldIndex::open(&index_dir, Field::Title).unwrap();
    assert_eq!(index.num_buckets(), 4);
    assert_eq!(index.lookup("Alpha").unwrap(), vec![ROW3, ROW1]);
    assert_eq!(index.lookup("Beta").unwrap(), vec![ROW2]);
    assert!(index.lookup("Gamma").unwrap().is_empty());
}

#[test]
fn test_build_all_indexes_both_fields() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path(), SOURCE);
    let index_dir = dir.path().join("nested").join("index");
    let config = IndexConfig {
        title_buckets: 4,
        author_buckets: 5,
        ..IndexConfig::default()
    };

    let report = build_all(&source, &index_dir, &config).unwrap();
    assert_eq!(report.title.rows_indexed, 3);
    assert_eq!(report.author.rows_indexed, 3);

    let authors = FieldIndex::open(&index_dir, Field::Author).unwrap();
    assert_eq!(authors.num_buckets(), 8);
    assert_eq!(authors.hash_seed(), config.hash_seed);
    assert_eq!(authors.lookup("Cid").unwrap(), vec![ROW3]);
    assert_eq!(authors.lookup("Ann").unwrap(), vec![ROW1]);
    assert!(authors.lookup("Alpha").unwrap().is_empty());
}

#[test]
fn test_power_of_two_enforced_on_disk() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path(), SOURCE);

    build_index(&source, dir.path(), Field::Title, 4096, 1).unwrap();
    let paths = IndexPaths::new(dir.path(), Field::Title);
    assert_eq!(BucketTable::open(&paths.buckets).unwrap().num_buckets(), 4096);

    build_index(&source, dir.path(), Field::Title, 5000, 1).unwrap();
    assert_eq!(BucketTable::open(&paths.buckets).unwrap().num_buckets(), 8192);
}

#[test]
fn test_idempotent_rebuild() {
    let dir = TempDir::new().unwrap();
    let source = write_source(
        dir.path(),
        "Title,Author\nAlpha,Ann\n\"Beta, Part 2\",Bob\nAlpha,Cid\n,Nobody\nCañón,Dee\n",
    );
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    let config = IndexConfig {
        title_buckets: 16,
        author_buckets: 16,
        hash_seed: 1234,
        match_mode: MatchMode::Exact,
    };

    build_all(&source, &first, &config).unwrap();
    build_all(&source, &second, &config).unwrap();

    for name in [
        "title_buckets.dat",
        "title_arrays.dat",
        "author_buckets.dat",
        "author_arrays.dat",
    ] {
        let a = std::fs::read(first.join(name)).unwrap();
        let b = std::fs::read(second.join(name)).unwrap();
        assert_eq!(a, b, "{} differs between rebuilds", name);
    }

    // Rebuilding in place overwrites rather than appends.
    let before = std::fs::read(first.join("title_arrays.dat")).unwrap();
    build_all(&source, &first, &config).unwrap();
    assert_eq!(std::fs::read(first.join("title_arrays.dat")).unwrap(), before);
}

#[test]
fn test_seed_persisted_and_used_by_reader() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path(), SOURCE);
    build_index(&source, dir.path(), Field::Title, 1024, 0xabcdef).unwrap();

    let index = FieldIndex::open(dir.path(), Field::Title).unwrap();
    assert_eq!(index.hash_seed(), 0xabcdef);
    assert_eq!(index.bucket_of("Alpha"), bucket_of("Alpha", 0xabcdef, 1024));
    assert_eq!(index.lookup("Alpha").unwrap(), vec![ROW3, ROW1]);
}

#[test]
fn test_exact_match_only() {
    let dir = TempDir::new().unwrap();
    let source = write_source(dir.path(), "Title,Author\nThe Hobbit,Tolkien\n");
    build_index(&source, dir.path(), Field::Title, 8, 3).unwrap();
    let index = FieldIndex::open(dir.path(), Field::Title).unwrap();

    // Placement: both spellings hash identically.
    assert_eq!(hash_key("the hobbit.", 3), hash_key("The Hobbit", 3));
    // Equality: only the raw spelling matches.
    assert!(index.lookup("the hobbit.").unwrap().is_empty());
    assert!(index.lookup("The Hobbit ").unwrap().is_empty());
    assert_eq!(index.lookup("The Hobbit").unwrap(), vec![13]);
}

#[test]
fn test_node_round_trip_through_log() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("arrays.dat");
    let mut log = NodeLog::create(&path).unwrap();

    let cases: Vec<(&str, Vec<u64>, u64)> = vec![
        ("Alpha", vec![13], 0),
        ("Gabriel García Márquez", vec![1, u64::MAX, 0, 42], 4096),
        ("", vec![], 0),
    ];
    let mut written = Vec::new();
    for (key, offsets, next) in &cases {
        written.push(log.append(key, offsets, *next).unwrap());
    }
    drop(log);

    let log = NodeLog::open_read_only(&path).unwrap();
    for ((key, offsets, next), off) in cases.iter().zip(written) {
        let node = log.read_node(off).unwrap();
        assert_eq!(node.key, key.as_bytes());
        assert_eq!(&node.offsets, offsets);
        assert_eq!(node.next_ptr, *next);
    }
}

#[test]
fn test_multi_offset_nodes_concatenate() {
    let dir = TempDir::new().unwrap();
    let paths = IndexPaths::new(dir.path(), Field::Author);
    let mut builder = Builder::create(&paths, 2, 8).unwrap();
    builder.insert_many("Ann", &[1, 2, 3]).unwrap();
    builder.insert("Ann", 4).unwrap();
    builder.finish().unwrap();

    let index = FieldIndex::open(dir.path(), Field::Author).unwrap();
    assert_eq!(index.lookup("Ann").unwrap(), vec![4, 1, 2, 3]);
}

#[test]
fn test_missing_source_fails_build() {
    let dir = TempDir::new().unwrap();
    let result = build_index(
        &dir.path().join("missing.csv"),
        dir.path(),
        Field::Title,
        4,
        0,
    );
    assert!(result.is_err());
}
