//! Run recording and report rendering
//!
//! The recorder accumulates one record per executed check or lifecycle event,
//! in execution order, and renders the run as JUnit-style XML for CI
//! ingestion. Records are immutable once appended; all annotation (restart
//! notes, soft warnings) happens while the record is being built.

use std::time::{Duration, Instant};

use crate::verify::CheckOutcome;

/// One executed check or lifecycle event
#[derive(Debug, Clone)]
pub struct RunRecord {
    /// Record name, `"<kind> - <item>"`
    pub name: String,

    /// Wall-clock duration from the check's own start to completion
    pub elapsed: Duration,

    /// Failure message when the check failed
    pub failure: Option<String>,

    /// Soft warning surfaced without failing the record
    pub warning: Option<String>,
}

impl RunRecord {
    /// Start building a record for a check that began at `started`
    pub fn new(kind: &str, item: &str, started: Instant) -> Self {
        let name = if item.is_empty() {
            kind.to_string()
        } else {
            format!("{kind} - {item}")
        };

        Self {
            name,
            elapsed: started.elapsed(),
            failure: None,
            warning: None,
        }
    }

    /// Attach a check outcome
    pub fn with_outcome(mut self, outcome: &CheckOutcome) -> Self {
        if let Some(reason) = outcome.reason() {
            self.failure = Some(format!("{} - failed: {reason}", self.name));
        }
        self
    }

    /// Mark the record failed with an explicit message
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Append a failure note, preserving any existing failure message
    pub fn with_failure_note(mut self, note: impl Into<String>) -> Self {
        let note = note.into();
        self.failure = Some(match self.failure.take() {
            Some(existing) => format!("{existing}; {note}"),
            None => note,
        });
        self
    }

    /// Attach a soft warning
    pub fn with_warning(mut self, message: impl Into<String>) -> Self {
        self.warning = Some(message.into());
        self
    }

    /// Whether this record failed
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }
}

/// Append-only accumulator for one scenario run
#[derive(Debug)]
pub struct RunRecorder {
    /// Scenario (test case) name
    scenario: String,

    /// Report namespace, `"systest.<offset>.<description>"`
    class_namespace: String,

    records: Vec<RunRecord>,
}

impl RunRecorder {
    /// Create a recorder keyed by cluster offset and test-case description
    pub fn new(scenario: impl Into<String>, offset: u32, description: &str) -> Self {
        Self {
            scenario: scenario.into(),
            class_namespace: format!("systest.{offset}.{description}"),
            records: Vec::new(),
        }
    }

    /// Append a finished record
    pub fn push(&mut self, record: RunRecord) {
        self.records.push(record);
    }

    /// Records in execution order
    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    /// Number of failed records
    pub fn failure_count(&self) -> usize {
        self.records.iter().filter(|r| r.failed()).count()
    }

    /// Whether every record passed
    pub fn all_passed(&self) -> bool {
        self.failure_count() == 0
    }

    /// Render the run as JUnit-style XML
    pub fn to_junit_xml(&self) -> String {
        let tests = self.records.len();
        let failures = self.failure_count();

        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(&format!(
            "<testsuites tests=\"{tests}\" failures=\"{failures}\">\n"
        ));
        xml.push_str(&format!(
            "  <testsuite name=\"{}\" package=\"systest\" tests=\"{tests}\" failures=\"{failures}\">\n",
            xml_escape(&self.scenario)
        ));

        for record in &self.records {
            let time = record.elapsed.as_secs_f64();
            xml.push_str(&format!(
                "    <testcase name=\"{}\" classname=\"{}\" time=\"{time:.3}\"",
                xml_escape(&record.name),
                xml_escape(&self.class_namespace)
            ));

            if record.failure.is_none() && record.warning.is_none() {
                xml.push_str("/>\n");
                continue;
            }
            xml.push_str(">\n");

            if let Some(failure) = &record.failure {
                xml.push_str(&format!(
                    "      <failure message=\"{}\"/>\n",
                    xml_escape(failure)
                ));
            }
            if let Some(warning) = &record.warning {
                xml.push_str(&format!(
                    "      <system-out>{}</system-out>\n",
                    xml_escape(warning)
                ));
            }

            xml.push_str("    </testcase>\n");
        }

        xml.push_str("  </testsuite>\n</testsuites>\n");
        xml
    }
}

fn xml_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_name_formats() {
        let started = Instant::now();
        let record = RunRecord::new("verify_indexed", "hello", started);
        assert_eq!(record.name, "verify_indexed - hello");

        let record = RunRecord::new("dump", "", started);
        assert_eq!(record.name, "dump");
    }

    #[test]
    fn test_record_outcome_and_notes() {
        let started = Instant::now();

        let record = RunRecord::new("verify_indexed", "hello", started)
            .with_outcome(&CheckOutcome::Pass);
        assert!(!record.failed());

        let record = RunRecord::new("verify_indexed", "hello", started)
            .with_outcome(&CheckOutcome::fail("no results"));
        assert!(record.failed());
        assert!(record.failure.as_deref().unwrap().contains("no results"));

        let record = record.with_failure_note("engine restarted");
        let message = record.failure.unwrap();
        assert!(message.contains("no results"));
        assert!(message.contains("engine restarted"));
    }

    #[test]
    fn test_failure_note_on_passing_record() {
        let record = RunRecord::new("verify_indexed", "hello", Instant::now())
            .with_failure_note("engine restarted");
        assert!(record.failed());
        assert_eq!(record.failure.as_deref(), Some("engine restarted"));
    }

    #[test]
    fn test_recorder_counts() {
        let mut recorder = RunRecorder::new("basic", 0, "basic crawl");
        recorder.push(RunRecord::new("pre", "start", Instant::now()));
        recorder.push(
            RunRecord::new("verify_indexed", "hello", Instant::now())
                .with_failure("no results"),
        );

        assert_eq!(recorder.records().len(), 2);
        assert_eq!(recorder.failure_count(), 1);
        assert!(!recorder.all_passed());
    }

    #[test]
    fn test_junit_xml_shape() {
        let mut recorder = RunRecorder::new("basic", 2, "basic crawl");
        recorder.push(RunRecord::new("pre", "start", Instant::now()));
        recorder.push(
            RunRecord::new("verify_indexed", "a & b", Instant::now())
                .with_failure("expected <1> result"),
        );
        recorder.push(
            RunRecord::new("pre", "spider", Instant::now()).with_warning("save failed"),
        );

        let xml = recorder.to_junit_xml();
        assert!(xml.starts_with("<?xml version=\"1.0\""));
        assert!(xml.contains("<testsuites tests=\"3\" failures=\"1\">"));
        assert!(xml.contains("name=\"basic\" package=\"systest\""));
        assert!(xml.contains("classname=\"systest.2.basic crawl\""));
        // Escaped payloads
        assert!(xml.contains("verify_indexed - a &amp; b"));
        assert!(xml.contains("expected &lt;1&gt; result"));
        assert!(xml.contains("<system-out>save failed</system-out>"));
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&apos;");
    }
}
