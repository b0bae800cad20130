//! Output formatters for plans, instance reports and failure lists

use anyhow::{Context, Result};
use serde::Serialize;
use std::str::FromStr;

use crate::models::{FailureRecord, InstanceReport, Partition, WorkerAssignment};
use crate::schedule::BatchClassifier;
use crate::utils::format_duration;

/// Output format options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Ok(OutputFormat::JsonPretty),
            "csv" => Ok(OutputFormat::Csv),
            "summary" => Ok(OutputFormat::Summary),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[derive(Serialize)]
struct PlanRow<'a> {
    instance: usize,
    module: &'a str,
    cost: u64,
    mode: &'static str,
}

#[derive(Serialize)]
struct OutcomeRow<'a> {
    instance: usize,
    batch: &'a str,
    test_id: &'a str,
    decision: String,
    fixture_changed: bool,
}

pub struct ReportFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ReportFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let out = if self.format == OutputFormat::JsonPretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        out.context("Failed to serialize output")
    }

    fn paint(&self, text: &str, color: &str) -> String {
        if self.colorize {
            format!("\x1b[{color}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    /// Format a partition; `only` restricts to one zero-based worker
    pub fn format_plan(
        &self,
        partition: &Partition,
        classifier: &BatchClassifier,
        only: Option<usize>,
    ) -> Result<String> {
        let workers: Vec<&WorkerAssignment> = partition
            .assignments()
            .iter()
            .filter(|w| only.map_or(true, |i| w.worker_index == i))
            .collect();

        match self.format {
            OutputFormat::Json | OutputFormat::JsonPretty => self.json(&workers),
            OutputFormat::Csv => {
                let mut rows = Vec::new();
                for worker in &workers {
                    for job in worker.jobs() {
                        rows.push(PlanRow {
                            instance: worker.worker_index + 1,
                            module: &job.module_id,
                            cost: job.estimated_cost,
                            mode: if classifier.is_serial(&job.module_id) {
                                "serial"
                            } else {
                                "parallel"
                            },
                        });
                    }
                }
                to_csv(&rows)
            }
            OutputFormat::Summary => Ok(format!(
                "{} module(s) on {} instance(s), makespan {}m, imbalance {}m",
                partition.job_count(),
                partition.worker_count(),
                partition.makespan(),
                partition.imbalance()
            )),
            OutputFormat::Table => {
                let mut output = String::new();
                output.push_str("\n┌──────────┬─────────┬──────────┬─────────────────────────────────────────┐\n");
                output.push_str("│ Instance │ Modules │ Cost (m) │ Assignment (* = serial)                 │\n");
                output.push_str("├──────────┼─────────┼──────────┼─────────────────────────────────────────┤\n");
                for worker in &workers {
                    let modules: Vec<String> = worker
                        .jobs()
                        .iter()
                        .map(|j| {
                            if classifier.is_serial(&j.module_id) {
                                format!("{}*", j.module_id)
                            } else {
                                j.module_id.clone()
                            }
                        })
                        .collect();
                    output.push_str(&format!(
                        "│ {:>8} │ {:>7} │ {:>8} │ {:39} │\n",
                        worker.worker_index + 1,
                        worker.jobs().len(),
                        worker.total_cost(),
                        modules.join(" ")
                    ));
                }
                output.push_str("└──────────┴─────────┴──────────┴─────────────────────────────────────────┘\n");
                output.push_str(&format!(
                    " Makespan: {}m | Imbalance: {}m\n",
                    partition.makespan(),
                    partition.imbalance()
                ));
                Ok(output)
            }
        }
    }

    pub fn format_instance(&self, report: &InstanceReport) -> Result<String> {
        match self.format {
            OutputFormat::Json | OutputFormat::JsonPretty => self.json(report),
            OutputFormat::Csv => {
                let rows: Vec<OutcomeRow> = report
                    .batches
                    .iter()
                    .flat_map(|b| {
                        b.outcomes.iter().map(|o| OutcomeRow {
                            instance: report.instance_index,
                            batch: &b.label,
                            test_id: &o.test_id,
                            decision: o.decision.to_string(),
                            fixture_changed: o.fixture_changed,
                        })
                    })
                    .collect();
                to_csv(&rows)
            }
            OutputFormat::Summary => Ok(format!(
                "Instance {}/{} [{}]: {} batch(es), {} recovered, {} confirmed, {} crashed module(s) in {}",
                report.instance_index,
                report.instance_count,
                if report.failed() { "FAIL" } else { "PASS" },
                report.batches.len(),
                report.recovered_tests().len(),
                report.confirmed_failures().len(),
                report.crashed_modules().len(),
                format_duration(report.duration_ms())
            )),
            OutputFormat::Table => Ok(self.instance_table(report)),
        }
    }

    fn instance_table(&self, report: &InstanceReport) -> String {
        let mut output = String::new();
        output.push_str("\n═══════════════════════════════════════════════════════════════\n");
        output.push_str(&format!(
            " Instance {}/{} ({}) started {}\n",
            report.instance_index,
            report.instance_count,
            report.profile,
            report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        output.push_str("═══════════════════════════════════════════════════════════════\n");

        for batch in &report.batches {
            let status = if batch.hard_failure {
                self.paint("CRASH", "31")
            } else if batch.failed {
                self.paint("FAIL", "31")
            } else {
                self.paint("PASS", "32")
            };
            output.push_str(&format!(
                " {:10} {:8} {:>3} module(s)  {}  {}\n",
                batch.label,
                batch.mode,
                batch.modules.len(),
                status,
                format_duration(batch.duration_ms)
            ));
            for outcome in &batch.outcomes {
                let changed = if outcome.fixture_changed {
                    " (recording refreshed)"
                } else {
                    ""
                };
                output.push_str(&format!(
                    "   - {} {}{}\n",
                    outcome.test_id, outcome.decision, changed
                ));
            }
            for test_id in &batch.unrecovered {
                output.push_str(&format!("   - {test_id} FAILED\n"));
            }
        }

        output.push_str(" ───────────────────────────────────────────────────────────\n");
        let crashed = report.crashed_modules();
        if !crashed.is_empty() {
            output.push_str(&format!(" Crashed modules: {}\n", crashed.join(", ")));
        }
        output.push_str(&format!(
            " Recovered: {} | Confirmed failures: {} | Duration: {}\n",
            report.recovered_tests().len(),
            report.confirmed_failures().len(),
            format_duration(report.duration_ms())
        ));
        output
    }

    pub fn format_failures(&self, failures: &[FailureRecord]) -> Result<String> {
        match self.format {
            OutputFormat::Json | OutputFormat::JsonPretty => self.json(failures),
            OutputFormat::Csv => to_csv(failures),
            OutputFormat::Summary => Ok(format!("{} failed test(s)", failures.len())),
            OutputFormat::Table => {
                let mut output = String::new();
                for failure in failures {
                    output.push_str(&format!(
                        "{}  {}\n",
                        self.paint(&failure.test_id, "31"),
                        failure.fixture_path.display()
                    ));
                }
                if failures.is_empty() {
                    output.push_str("No failed tests\n");
                }
                Ok(output)
            }
        }
    }
}

impl Default for ReportFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

fn to_csv<T: Serialize>(rows: &[T]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row).context("Failed to write CSV row")?;
    }
    let bytes = writer.into_inner().context("Failed to flush CSV")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}
