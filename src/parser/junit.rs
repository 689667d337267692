//! JUnit XML decoder.
//!
//! Accepts both a `<testsuites>` root and a bare `<testsuite>` root. Each
//! `<testcase>` becomes one result:
//!
//! | JUnit | Canonical |
//! |-------|-----------|
//! | `<failure>` | `failed`, body as stack trace |
//! | `<error>` | `invalid`, body as stack trace |
//! | `<skipped>` | `skipped` |
//! | none of the above | `passed` |
//! | `<properties>` | `fields` |
//! | `<system-out>` / `<system-err>` | text attachments |

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Deserialize;
use uuid::Uuid;

use super::{ParserError, ParserResult, ReportParser, decode_each, discover_files, has_extension};
use crate::model::{Attachment, Status, TestResult};

#[derive(Debug, Default, Deserialize)]
struct TestSuites {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "testsuite", default)]
    suites: Vec<TestSuite>,
}

#[derive(Debug, Default, Deserialize)]
struct TestSuite {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "testcase", default)]
    cases: Vec<TestCase>,
}

#[derive(Debug, Default, Deserialize)]
struct TestCase {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@classname", default)]
    classname: String,
    /// Seconds.
    #[serde(rename = "@time", default)]
    time: Option<f64>,
    #[serde(default)]
    failure: Option<Problem>,
    #[serde(default)]
    error: Option<Problem>,
    #[serde(default)]
    skipped: Option<Problem>,
    #[serde(rename = "system-out", default)]
    system_out: Option<String>,
    #[serde(rename = "system-err", default)]
    system_err: Option<String>,
    #[serde(default)]
    properties: Properties,
}

#[derive(Debug, Default, Deserialize)]
struct Problem {
    #[serde(rename = "@message", default)]
    message: String,
    #[serde(rename = "$text", default)]
    body: String,
}

#[derive(Debug, Default, Deserialize)]
struct Properties {
    #[serde(rename = "property", default)]
    property: Vec<Property>,
}

#[derive(Debug, Deserialize)]
struct Property {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@value", default)]
    value: String,
}

/// Decoder for JUnit XML files.
pub struct JunitParser {
    path: PathBuf,
}

impl JunitParser {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn parse_file(path: &Path) -> ParserResult<Vec<TestResult>> {
        let content = std::fs::read_to_string(path)?;
        parse_junit_xml(&content)
    }
}

#[async_trait]
impl ReportParser for JunitParser {
    async fn parse(&self) -> ParserResult<Vec<TestResult>> {
        let files = discover_files(&self.path, |p| has_extension(p, "xml"))?;
        Ok(decode_each(&files, Self::parse_file))
    }

    fn name(&self) -> &'static str {
        "junit"
    }
}

/// Parses one JUnit document into results.
pub fn parse_junit_xml(content: &str) -> ParserResult<Vec<TestResult>> {
    let suites = match root_element(content)?.as_deref() {
        Some("testsuites") => quick_xml::de::from_str::<TestSuites>(content)?,
        Some("testsuite") => TestSuites {
            name: String::new(),
            suites: vec![quick_xml::de::from_str::<TestSuite>(content)?],
        },
        Some(other) => {
            return Err(ParserError::Other(anyhow::anyhow!(
                "unexpected root element <{}>",
                other
            )));
        }
        None => return Ok(Vec::new()),
    };

    let mut results = Vec::new();
    for suite in &suites.suites {
        for case in &suite.cases {
            results.push(convert_case(&suites.name, suite, case));
        }
    }
    Ok(results)
}

fn root_element(content: &str) -> ParserResult<Option<String>> {
    let mut reader = Reader::from_str(content);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(Some(
                    String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                ));
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(e) => return Err(ParserError::Other(e.into())),
        }
    }
}

fn suite_path(root_name: &str, suite_name: &str) -> Vec<String> {
    let mut titles = Vec::new();
    if !root_name.is_empty() {
        titles.push(root_name.to_string());
    }
    titles.extend(suite_name.split('/').map(String::from));
    titles
}

fn convert_case(root_name: &str, suite: &TestSuite, case: &TestCase) -> TestResult {
    let signature = format!(
        "{}::{}::{}::{}",
        root_name, suite.name, case.classname, case.name
    );

    let mut result = TestResult::new(&case.name, Status::Passed)
        .with_signature(signature)
        .with_suites(suite_path(root_name, &suite.name));

    if let Some(failure) = &case.failure {
        result.execution.status = Status::Failed;
        result.execution.stack_trace = Some(failure.body.clone());
        result.message = Some(failure.message.clone());
    }
    if let Some(error) = &case.error {
        result.execution.status = Status::Invalid;
        result.execution.stack_trace = Some(error.body.clone());
        result.message = Some(error.message.clone());
    }
    if let Some(skipped) = &case.skipped {
        result.execution.status = Status::Skipped;
        result.message = Some(skipped.message.clone());
    }

    result.execution.duration = case.time.map(|secs| secs * 1000.0);

    for property in &case.properties.property {
        result
            .fields
            .insert(property.name.clone(), property.value.clone());
    }

    for (name, output) in [
        ("system-out.txt", &case.system_out),
        ("system-err.txt", &case.system_err),
    ] {
        if let Some(text) = output
            && !text.is_empty()
        {
            result.attachments.push(
                Attachment::from_content(name, text.clone().into_bytes())
                    .with_content_type("text/plain")
                    .with_id(Uuid::new_v4()),
            );
        }
    }

    result
}
