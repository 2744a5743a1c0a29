use colored::Colorize;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};

use crate::cards::{Card, Deck};
use crate::game_tree::Action;

pub fn board_display(deck: &Deck, cards: &[Card]) -> String {
    if cards.is_empty() {
        return "-".dimmed().to_string();
    }
    cards
        .iter()
        .map(|&card| {
            let text = deck.format_card(card);
            match deck.suit(card) {
                0 => text.white().to_string(),
                1 => text.red().to_string(),
                2 => text.blue().to_string(),
                _ => text.green().to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn styled_action(action: &Action) -> String {
    let text = action.to_string();
    match action {
        Action::Bet(_) | Action::Raise(_) => text.red().bold().to_string(),
        Action::Call => text.green().bold().to_string(),
        Action::Fold => text.dimmed().bold().to_string(),
        Action::Check => text.yellow().bold().to_string(),
    }
}

fn frequency_cell(freq: f64) -> Cell {
    let text = format!("{:.1}%", freq * 100.0);
    let styled = if freq >= 0.75 {
        text.green().bold().to_string()
    } else if freq >= 0.25 {
        text.yellow().to_string()
    } else if freq > 0.0 {
        text.normal().to_string()
    } else {
        text.dimmed().to_string()
    };
    Cell::new(styled).set_alignment(CellAlignment::Right)
}

/// One row per holding, one column per action.
pub fn strategy_table(actions: &[Action], rows: &[(String, Vec<f64>)]) -> String {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let mut header = vec![Cell::new("Hand")];
    for a in actions {
        header.push(Cell::new(styled_action(a)).set_alignment(CellAlignment::Center));
    }
    table.set_header(header);

    for (label, freqs) in rows {
        let mut row = vec![Cell::new(label.bold().to_string())];
        row.extend(freqs.iter().map(|&f| frequency_cell(f)));
        table.add_row(row);
    }
    table.to_string()
}

/// Summary of a finished run.
pub fn summary_table(iterations: u64, game_value: f64, exploitability: f64, seconds: f64) -> String {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Metric").set_alignment(CellAlignment::Left),
        Cell::new("Value").set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Iterations".bold().to_string()),
        Cell::new(iterations.to_string()).set_alignment(CellAlignment::Right),
    ]);
    let value = format!("{:+.5}", game_value);
    let value = if game_value >= 0.0 { value.green() } else { value.red() };
    table.add_row(vec![
        Cell::new("Game value (P1)".bold().to_string()),
        Cell::new(value.to_string()).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Exploitability".bold().to_string()),
        Cell::new(format!("{:.6}", exploitability)).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Time".bold().to_string()),
        Cell::new(format!("{:.2}s", seconds)).set_alignment(CellAlignment::Right),
    ]);
    table.to_string()
}

pub fn print_section(title: &str, content: &str) {
    println!("\n{}", title.cyan().bold());
    println!("{}", content);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "Error:".red().bold(), msg);
}

pub fn print_success(msg: &str) {
    println!("{}", msg.green().bold());
}
