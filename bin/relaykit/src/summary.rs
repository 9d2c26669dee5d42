//! Terminal tables for run reports and ledgers.

use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};
use relaykit_deploy::{LedgerDocument, RunReport};

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

/// One row per target: status, steps completed, transactions sent and the
/// failing step if any.
pub fn run_table(report: &RunReport) -> Table {
    let mut table = table(&["Target", "Status", "Steps", "Transactions", "Failure"]);

    for target in &report.targets {
        let status = if target.is_success() {
            Cell::new("ok").fg(Color::Green)
        } else {
            Cell::new("failed").fg(Color::Red)
        };

        let failure = match (&target.failure, &target.persist_error) {
            (Some(failure), _) => format!("{}: {}", failure.step, failure.error),
            (None, Some(error)) => format!("ledger: {error}"),
            (None, None) => String::new(),
        };

        table.add_row(vec![
            Cell::new(target.target),
            status,
            Cell::new(target.steps.len()),
            Cell::new(target.transactions()),
            Cell::new(failure),
        ]);
    }

    table
}

/// Per-step detail of one run.
pub fn steps_table(report: &RunReport) -> Table {
    let mut table = table(&["Target", "Step", "Outcome"]);

    for target in &report.targets {
        for record in &target.steps {
            table.add_row(vec![
                Cell::new(target.target),
                Cell::new(&record.step),
                Cell::new(&record.outcome),
            ]);
        }
    }

    table
}

/// Every recorded address, grouped by target.
pub fn ledger_table(ledger: &LedgerDocument) -> Table {
    let mut table = table(&["Target", "Component", "Address"]);

    for (target, slice) in ledger.iter() {
        if let Some(block) = slice.start_block() {
            table.add_row(vec![
                Cell::new(target),
                Cell::new("startBlock"),
                Cell::new(block),
            ]);
        }
        for (component, address) in slice.iter() {
            table.add_row(vec![
                Cell::new(target),
                Cell::new(component),
                Cell::new(address),
            ]);
        }
    }

    table
}
