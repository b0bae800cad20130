//! JUnit report failure extraction
//!
//! Reads the suite/case tree written by the test engine and maps every
//! failed case to the recording that backs it.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ShardError, ShardResult};
use crate::models::FailureRecord;

/// Where recordings live relative to a test's source file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureLayout {
    /// Sibling directory of the test source holding recordings
    pub dir_name: String,
    /// Recording file extension, without the dot
    pub extension: String,
}

impl Default for FixtureLayout {
    fn default() -> Self {
        Self {
            dir_name: "recordings".to_string(),
            extension: "yaml".to_string(),
        }
    }
}

impl FixtureLayout {
    /// `<dir of source_file>/<dir_name>/<test_name>.<extension>`
    pub fn fixture_for(&self, source_file: &str, test_name: &str) -> PathBuf {
        let source_dir = Path::new(source_file).parent().unwrap_or(Path::new(""));
        source_dir
            .join(&self.dir_name)
            .join(format!("{}.{}", test_name, self.extension))
    }
}

#[derive(Debug, Default, Deserialize)]
struct SuiteNode {
    #[serde(rename = "testsuite", default)]
    suites: Vec<SuiteNode>,
    #[serde(rename = "testcase", default)]
    cases: Vec<CaseNode>,
}

#[derive(Debug, Deserialize)]
struct CaseNode {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@classname", default)]
    classname: String,
    #[serde(rename = "@file")]
    file: Option<String>,
    #[serde(rename = "failure", default)]
    failures: Vec<FailureMarker>,
    #[serde(rename = "error", default)]
    errors: Vec<FailureMarker>,
    #[serde(rename = "skipped", default)]
    skipped: Vec<FailureMarker>,
}

impl CaseNode {
    fn test_id(&self) -> String {
        if self.classname.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.classname, self.name)
        }
    }

    /// Ran to completion without any failure, error or skip marker
    fn passed(&self) -> bool {
        self.failures.is_empty() && self.errors.is_empty() && self.skipped.is_empty()
    }
}

/// Every case of one report, split by verdict
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportCases {
    /// Cases carrying a `failure` marker
    pub failed: Vec<FailureRecord>,
    /// Ids of cases that passed outright
    pub passed: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
struct FailureMarker {
    #[serde(rename = "@message")]
    message: Option<String>,
}

impl SuiteNode {
    fn collect<'a>(&'a self, out: &mut Vec<&'a CaseNode>) {
        out.extend(self.cases.iter());
        for suite in &self.suites {
            suite.collect(out);
        }
    }
}

/// Parses reports into failure records
#[derive(Clone, Debug, Default)]
pub struct FailureExtractor {
    layout: FixtureLayout,
}

impl FailureExtractor {
    pub fn new(layout: FixtureLayout) -> Self {
        Self { layout }
    }

    /// Extract failures from a report file
    pub fn extract(&self, path: &Path) -> ShardResult<Vec<FailureRecord>> {
        Ok(self.read(path)?.failed)
    }

    /// Failed and passed cases of a report file
    pub fn read(&self, path: &Path) -> ShardResult<ReportCases> {
        let content = std::fs::read_to_string(path).map_err(|e| ShardError::MalformedReport {
            path: path.to_path_buf(),
            reason: format!("unreadable: {e}"),
        })?;
        let cases = self.read_str(&content, path)?;
        info!(
            "{} failed, {} passed test(s) in {}",
            cases.failed.len(),
            cases.passed.len(),
            path.display()
        );
        Ok(cases)
    }

    /// Extract failures from report content; `path` is only used in errors
    #[cfg(test)]
    pub fn extract_str(&self, xml: &str, path: &Path) -> ShardResult<Vec<FailureRecord>> {
        Ok(self.read_str(xml, path)?.failed)
    }

    pub fn read_str(&self, xml: &str, path: &Path) -> ShardResult<ReportCases> {
        let malformed = |reason: String| ShardError::MalformedReport {
            path: path.to_path_buf(),
            reason,
        };

        let root = root_element(xml).map_err(malformed)?;
        if root != "testsuites" && root != "testsuite" {
            return Err(malformed(format!("unexpected root element <{root}>")));
        }

        let tree: SuiteNode =
            quick_xml::de::from_str(xml).map_err(|e| malformed(e.to_string()))?;

        let mut cases = Vec::new();
        tree.collect(&mut cases);

        let mut failed: BTreeMap<String, PathBuf> = BTreeMap::new();
        let mut passed = BTreeSet::new();
        for case in cases {
            if case.passed() {
                passed.insert(case.test_id());
                continue;
            }
            if case.failures.is_empty() {
                continue;
            }
            let file = case.file.as_deref().ok_or_else(|| {
                malformed(format!("failed case {} has no file attribute", case.name))
            })?;
            let test_id = case.test_id();
            if let Some(message) = case.failures.iter().find_map(|m| m.message.as_deref()) {
                debug!("{} failed: {}", test_id, message);
            }
            failed.insert(test_id, self.layout.fixture_for(file, &case.name));
        }
        // A case reported twice counts as failed
        passed.retain(|id| !failed.contains_key(id));

        Ok(ReportCases {
            failed: failed
                .into_iter()
                .map(|(test_id, fixture)| FailureRecord::new(test_id, fixture))
                .collect(),
            passed,
        })
    }
}

/// Name of the document's root element
fn root_element(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Ok(Event::Eof) => return Err("document has no root element".to_string()),
            Ok(_) => continue,
            Err(e) => return Err(e.to_string()),
        }
    }
}
