//! Common test utilities and helpers for integration tests

use std::path::Path;

use tally_core::{Key, TallyContext};

/// Create a test context with a given name and worker count
pub fn create_test_context(name: &str, threads: usize) -> TallyContext {
    TallyContext::local(name, threads).expect("test context")
}

/// Owned lines from string literals
pub fn lines(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

/// Sales records: `product,quantity,amount`
pub fn sales_lines() -> Vec<String> {
    lines(&["A,1,10", "B,1,5", "A,1,7"])
}

/// Car sales records: `model,make,year,country,state`
#[allow(dead_code)] // not every test binary uses every helper
pub fn car_sales_lines() -> Vec<String> {
    lines(&[
        "Civic,Honda,2005,US,CA",
        "Civic,Honda,2008,Japan,",
        "Prius,Toyota,2010,US,NY",
        "Model T,Ford,1908,US,MI",
        "Civic,Honda,2011,US,CA",
        "Golf,VW,2003,Germany,",
        "Prius,Toyota,2007,Japan,",
    ])
}

/// `(key, total)` pairs with single-part keys
#[allow(dead_code)]
pub fn totals(expected: &[(&str, i64)]) -> Vec<(Key, i64)> {
    expected
        .iter()
        .map(|(key, total)| (Key::from(*key), *total))
        .collect()
}

/// Write `contents` to `dir/name`
#[allow(dead_code)]
pub fn write_file(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).expect("write test file");
}

/// Names of the part files directly under `dir`
#[allow(dead_code)]
pub fn part_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read output dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("part-"))
        .collect();
    names.sort();
    names
}
