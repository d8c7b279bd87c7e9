//! Result reporting: console lines as the flow progresses and a final run document.

use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use action_flow::{
    AvailabilityOutcome, FirstProductCheck, FlowEvents, FlowStep, ProductRecord, RunConfig,
    UnavailableReason,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::output::OutputFormat;

/// Machine-readable summary of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub city: String,
    pub product: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub availability: Option<AvailabilityOutcome>,
    pub first_product: Option<FirstProductCheck>,
    pub error: Option<String>,
}

impl RunReport {
    pub fn render(&self, format: &OutputFormat) -> anyhow::Result<String> {
        Ok(match format {
            OutputFormat::Json => serde_json::to_string_pretty(self)?,
            OutputFormat::Yaml => serde_yaml::to_string(self)?,
            OutputFormat::Human => self.summary_line(),
        })
    }

    fn summary_line(&self) -> String {
        match &self.error {
            Some(error) => format!("An error occurred in the main flow: {error}"),
            None => format!("Probe finished for \"{}\" in {}", self.product, self.city),
        }
    }
}

/// Prints progress in human mode and keeps outcomes for the final [`RunReport`].
pub struct ConsoleReporter {
    format: OutputFormat,
    started_at: DateTime<Utc>,
    availability: Mutex<Option<AvailabilityOutcome>>,
    first_product: Mutex<Option<FirstProductCheck>>,
}

impl ConsoleReporter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            started_at: Utc::now(),
            availability: Mutex::new(None),
            first_product: Mutex::new(None),
        }
    }

    fn human(&self) -> bool {
        matches!(self.format, OutputFormat::Human)
    }

    fn print(&self, line: &str) {
        if self.human() {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{line}");
        }
    }

    /// Assemble the run document from everything observed so far.
    pub fn finish(&self, run: &RunConfig, error: Option<String>) -> RunReport {
        let availability = self
            .availability
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();
        let first_product = self
            .first_product
            .lock()
            .map(|guard| *guard)
            .unwrap_or_default();
        RunReport {
            city: run.city.clone(),
            product: run.product.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            availability,
            first_product,
            error,
        }
    }
}

impl FlowEvents for ConsoleReporter {
    fn step_completed(&self, step: FlowStep, elapsed: Duration) {
        debug!(%step, elapsed_ms = elapsed.as_millis() as u64, "step done");
    }

    fn availability_determined(&self, product: &str, outcome: &AvailabilityOutcome) {
        match outcome {
            AvailabilityOutcome::Unavailable => {
                self.print(&format!("Product \"{product}\" is NOT available currently."));
            }
            AvailabilityOutcome::Available(records) => {
                self.print(&format!("Product \"{product}\" is available."));
                self.print("Extracted product details:");
                self.print(&render_table(records));
            }
        }
        if let Ok(mut slot) = self.availability.lock() {
            *slot = Some(outcome.clone());
        }
    }

    fn first_product_checked(&self, product: &str, check: &FirstProductCheck) {
        let line = match check {
            FirstProductCheck::Available { added_to_cart: true } => {
                format!("Product \"{product}\" is available (one unit added to cart)")
            }
            FirstProductCheck::Available {
                added_to_cart: false,
            } => format!("Product \"{product}\" is available"),
            FirstProductCheck::Unavailable { reason } => {
                let why = match reason {
                    UnavailableReason::ControlMissing => "no quantity control",
                    UnavailableReason::ControlDisabled => "quantity control disabled",
                };
                format!("Product \"{product}\" is currently unavailable ({why})")
            }
            FirstProductCheck::NotFound => format!("Product \"{product}\" not found."),
        };
        self.print(&line);
        if let Ok(mut slot) = self.first_product.lock() {
            *slot = Some(*check);
        }
    }
}

/// Aligned text table of product records, one row per card in page order.
pub fn render_table(records: &[ProductRecord]) -> String {
    let headers = ["#", "Name", "Price", "Quantity"];
    let rows: Vec<[String; 4]> = records
        .iter()
        .enumerate()
        .map(|(idx, r)| {
            [
                idx.to_string(),
                r.name.clone(),
                r.price.clone(),
                r.quantity.clone(),
            ]
        })
        .collect();

    let mut widths = headers.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: [&str; 4]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(widths.iter())
            .map(|(cell, width)| {
                let pad = width.saturating_sub(cell.chars().count());
                format!("{cell}{}", " ".repeat(pad))
            })
            .collect();
        format!("| {} |", padded.join(" | "))
    };
    let rule = format!(
        "+{}+",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );

    let mut out = vec![rule.clone(), line(headers), rule.clone()];
    for row in &rows {
        out.push(line([
            row[0].as_str(),
            row[1].as_str(),
            row[2].as_str(),
            row[3].as_str(),
        ]));
    }
    out.push(rule);
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, price: &str, quantity: &str) -> ProductRecord {
        ProductRecord {
            name: name.into(),
            price: price.into(),
            quantity: quantity.into(),
        }
    }

    #[test]
    fn table_columns_align_on_widest_cell() {
        let table = render_table(&[
            record("Amul Taaza Toned Milk", "₹28", "500 ml"),
            record("Milk", "N/A", "1 L"),
        ]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 6);
        let widths: Vec<usize> = lines.iter().map(|l| l.chars().count()).collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]));
        assert!(lines[3].contains("Amul Taaza Toned Milk"));
        assert!(lines[4].starts_with("| 1 "));
    }

    #[test]
    fn reporter_keeps_outcomes_for_the_run_document() {
        let reporter = ConsoleReporter::new(OutputFormat::Json);
        reporter.availability_determined("milk", &AvailabilityOutcome::Unavailable);
        let run = RunConfig::new("Pune", "milk");
        let report = reporter.finish(&run, Some("boom".into()));
        assert_eq!(report.availability, Some(AvailabilityOutcome::Unavailable));
        assert_eq!(report.first_product, None);

        let json: serde_json::Value =
            serde_json::from_str(&report.render(&OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["availability"]["status"], "unavailable");
        assert_eq!(json["error"], "boom");
        assert!(json["first_product"].is_null());
    }
}
