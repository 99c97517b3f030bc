use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame,
};
use std::collections::HashMap;

use crate::models::Constituent;

/// Number of companies shown individually in the weight breakdown
pub const TOP_N: usize = 12;

/// Label prefix of the aggregated remainder slice
pub const REMAINDER_LABEL: &str = "Pozostałe";

/// Aggregated figures for one sector
#[derive(Debug, Clone, PartialEq)]
pub struct SectorSummary {
    pub sector: String,
    pub share: f64,
    pub turnover: f64,
    pub companies: usize,
    /// Share-weighted average daily change
    pub change_pct: f64,
}

/// Constituents ordered by index weight, heaviest first
pub fn sorted_by_share(constituents: &[Constituent]) -> Vec<&Constituent> {
    let mut sorted: Vec<&Constituent> = constituents.iter().collect();
    sorted.sort_by(|a, b| b.share.total_cmp(&a.share).then_with(|| a.ticker.cmp(&b.ticker)));
    sorted
}

/// Top `n` weights plus one remainder entry for everything else
pub fn top_weights(constituents: &[Constituent], n: usize) -> Vec<(String, f64)> {
    let sorted = sorted_by_share(constituents);
    let mut weights: Vec<(String, f64)> = sorted
        .iter()
        .take(n)
        .map(|c| (c.ticker.clone(), c.share))
        .collect();

    let rest = &sorted[n.min(sorted.len())..];
    if !rest.is_empty() {
        let rest_share = rest.iter().map(|c| c.share).sum();
        weights.push((format!("{} ({})", REMAINDER_LABEL, rest.len()), rest_share));
    }
    weights
}

/// Per-sector totals, largest share first
pub fn sector_breakdown(constituents: &[Constituent]) -> Vec<SectorSummary> {
    let mut by_sector: HashMap<&str, SectorSummary> = HashMap::new();
    let mut weighted_change: HashMap<&str, f64> = HashMap::new();

    for c in constituents {
        let entry = by_sector.entry(c.sector.as_str()).or_insert_with(|| SectorSummary {
            sector: c.sector.clone(),
            share: 0.0,
            turnover: 0.0,
            companies: 0,
            change_pct: 0.0,
        });
        entry.share += c.share;
        entry.turnover += c.turnover;
        entry.companies += 1;
        *weighted_change.entry(c.sector.as_str()).or_insert(0.0) += c.change_pct * c.share;
    }

    let mut summaries: Vec<SectorSummary> = by_sector
        .into_iter()
        .map(|(name, mut s)| {
            if s.share > 0.0 {
                s.change_pct = weighted_change[name] / s.share;
            }
            s
        })
        .collect();

    summaries.sort_by(|a, b| b.share.total_cmp(&a.share).then_with(|| a.sector.cmp(&b.sector)));
    summaries
}

fn change_style(change: f64) -> Style {
    if change > 0.0 {
        Style::default().fg(Color::Green)
    } else if change < 0.0 {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Gray)
    }
}

fn header_style() -> Style {
    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
}

fn share_bar(share: f64, max_share: f64, width: usize) -> String {
    if max_share <= 0.0 {
        return String::new();
    }
    let filled = ((share / max_share) * width as f64).round() as usize;
    "█".repeat(filled.min(width))
}

/// Companies tab: weight breakdown on the left, full list on the right
pub fn render_companies(f: &mut Frame, area: Rect, constituents: &[Constituent]) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let weights = top_weights(constituents, TOP_N);
    let max_share = weights.iter().map(|(_, s)| *s).fold(0.0, f64::max);
    let weight_rows = weights.iter().map(|(label, share)| {
        let style = if label.starts_with(REMAINDER_LABEL) {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default().fg(Color::Cyan)
        };
        Row::new(vec![
            Cell::from(label.clone()),
            Cell::from(format!("{:>6.2}%", share)),
            Cell::from(share_bar(*share, max_share, 20)).style(style),
        ])
    });

    let weights_table = Table::new(
        weight_rows,
        [Constraint::Length(16), Constraint::Length(8), Constraint::Min(10)],
    )
    .header(Row::new(vec!["Spółka", "Udział", ""]).style(header_style()))
    .block(Block::default().borders(Borders::ALL).title("Top Spółki (wg udziału)"));
    f.render_widget(weights_table, chunks[0]);

    let rows = sorted_by_share(constituents)
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            Row::new(vec![
                Cell::from(format!("{}", i + 1)),
                Cell::from(c.ticker.clone()),
                Cell::from(c.sector.clone()),
                Cell::from(format!("{:.2}", c.price)),
                Cell::from(format!("{:+.2}%", c.change_pct)).style(change_style(c.change_pct)),
                Cell::from(format!("{:.2}%", c.share)),
            ])
        });

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Length(12),
            Constraint::Length(18),
            Constraint::Length(10),
            Constraint::Length(9),
            Constraint::Length(8),
        ],
    )
    .header(Row::new(vec!["Lp.", "Ticker", "Sektor", "Kurs", "Zmiana", "Udział"]).style(header_style()))
    .block(Block::default().borders(Borders::ALL).title(format!("Lista Spółek ({})", constituents.len())));
    f.render_widget(table, chunks[1]);
}

/// Sectors tab: ranking by summed index weight
pub fn render_sectors(f: &mut Frame, area: Rect, constituents: &[Constituent]) {
    let summaries = sector_breakdown(constituents);
    let max_share = summaries.iter().map(|s| s.share).fold(0.0, f64::max);

    let rows = summaries.iter().enumerate().map(|(i, s)| {
        Row::new(vec![
            Cell::from(format!("{}", i + 1)),
            Cell::from(s.sector.clone()),
            Cell::from(format!("{}", s.companies)),
            Cell::from(format!("{:.2}%", s.share)),
            Cell::from(format!("{:+.2}%", s.change_pct)).style(change_style(s.change_pct)),
            Cell::from(format!("{:.1} mln", s.turnover / 1_000_000.0)),
            Cell::from(share_bar(s.share, max_share, 24)).style(Style::default().fg(Color::Cyan)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Length(20),
            Constraint::Length(6),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(12),
            Constraint::Min(10),
        ],
    )
    .header(
        Row::new(vec!["Lp.", "Sektor", "Spółek", "Udział", "Zmiana", "Obrót", ""]).style(header_style()),
    )
    .block(Block::default().borders(Borders::ALL).title("Ranking Sektorów"));
    f.render_widget(table, area);
}

/// Placeholder shown until the first snapshot arrives
pub fn render_empty(f: &mut Frame, area: Rect) {
    let paragraph = Paragraph::new(vec![
        Line::from("Brak danych w bazie."),
        Line::from(""),
        Line::from("Run `swig-tracker update-composition` to download the index basket."),
    ])
    .block(Block::default().borders(Borders::ALL).title("sWIG80"))
    .style(Style::default().fg(Color::White));
    f.render_widget(paragraph, area);
}
