//! Delimited exports of the participant list.
//!
//! Two fixed formats:
//! - standard: UTF-8 BOM, `;` separated, spreadsheet formula injection neutralized;
//! - official: the 7-column file expected by the school administration.

use std::collections::HashMap;

use crate::models::{Member, Team};

pub const BOM: &str = "\u{feff}";
pub const SEPARATOR: char = ';';

/// Leading characters a spreadsheet would evaluate as a formula.
const FORMULA_PREFIXES: &[char] = &['=', '+', '-', '@', '\t', '\r'];

/// Escape one cell of the standard export.
///
/// Formula-like cells get a leading apostrophe and are always quoted. Other cells are
/// quoted only when they contain the separator, a quote or a line break.
pub fn escape_cell(value: &str) -> String {
    let neutralized = value.starts_with(FORMULA_PREFIXES);
    let needs_quotes = neutralized
        || value.contains(SEPARATOR)
        || value.contains('"')
        || value.contains('\n')
        || value.contains('\r');

    if !needs_quotes {
        return value.to_string();
    }

    let body = value.replace('"', "\"\"");
    if neutralized {
        format!("\"'{}\"", body)
    } else {
        format!("\"{}\"", body)
    }
}

/// Render rows in the standard format, header first.
pub fn standard_csv(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut out = String::from(BOM);
    push_line(&mut out, headers.iter().map(|h| escape_cell(h)));
    for row in rows {
        push_line(&mut out, row.iter().map(|cell| escape_cell(cell)));
    }
    out
}

fn push_line(out: &mut String, cells: impl Iterator<Item = String>) {
    let line: Vec<String> = cells.collect();
    out.push_str(&line.join(&SEPARATOR.to_string()));
    out.push('\n');
}

pub const STANDARD_HEADERS: &[&str] = &[
    "Equipe",
    "Prénom",
    "Nom",
    "Email",
    "Niveau bac",
    "Chef d'équipe",
    "Régime alimentaire",
    "Salle",
    "Statut paiement",
    "Mode de paiement",
    "Montant",
    "Tarif",
    "Présent",
    "Pizza",
];

/// Full participant list in the standard format, ordered by team then surname.
pub fn participants_standard_csv(teams: &[Team], members: &[Member]) -> String {
    let by_id: HashMap<&str, &Team> = teams.iter().map(|t| (t.id.as_str(), t)).collect();

    let mut sorted: Vec<&Member> = members.iter().collect();
    sorted.sort_by(|a, b| {
        let team_a = by_id.get(a.team_id.as_str()).map(|t| t.name.as_str());
        let team_b = by_id.get(b.team_id.as_str()).map(|t| t.name.as_str());
        team_a
            .cmp(&team_b)
            .then_with(|| a.last_name.cmp(&b.last_name))
            .then_with(|| a.first_name.cmp(&b.first_name))
    });

    let rows: Vec<Vec<String>> = sorted
        .into_iter()
        .map(|m| {
            let team = by_id.get(m.team_id.as_str());
            vec![
                team.map(|t| t.name.clone()).unwrap_or_default(),
                m.first_name.clone(),
                m.last_name.clone(),
                m.email.clone(),
                m.bac_level.to_string(),
                yes_no(m.is_leader),
                m.food_diet.clone().unwrap_or_default(),
                team.and_then(|t| t.room.clone()).unwrap_or_default(),
                m.payment_status.as_str().to_string(),
                m.payment_method
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default(),
                m.payment_amount.map(format_amount).unwrap_or_default(),
                m.payment_tier
                    .map(|t| t.as_str().to_string())
                    .or_else(|| m.registration_tier.map(|t| t.as_str().to_string()))
                    .unwrap_or_default(),
                yes_no(m.checked_in),
                yes_no(m.pizza_received),
            ]
        })
        .collect();

    standard_csv(STANDARD_HEADERS, &rows)
}

pub const OFFICIAL_HEADERS: [&str; 7] = [
    "Prénom",
    "Nom",
    "Email",
    "Niveau bac",
    "Equipe",
    "Chef d'équipe",
    "Etablissement",
];

/// The official 7-column export. Organisation members are not participants and are left out.
pub fn official_csv(teams: &[Team], members: &[Member], school: &str) -> String {
    let by_id: HashMap<&str, &Team> = teams.iter().map(|t| (t.id.as_str(), t)).collect();

    let mut out = String::new();
    out.push_str(&OFFICIAL_HEADERS.join(";"));
    out.push('\n');

    for m in members {
        let Some(team) = by_id.get(m.team_id.as_str()) else {
            continue;
        };
        if team.is_organisation() {
            continue;
        }
        let cells = [
            official_cell(&m.first_name),
            official_cell(&m.last_name.to_uppercase()),
            official_cell(&m.email),
            m.bac_level.to_string(),
            official_cell(&team.name),
            if m.is_leader { "1" } else { "0" }.to_string(),
            official_cell(school),
        ];
        out.push_str(&cells.join(";"));
        out.push('\n');
    }

    out
}

/// The official format carries no quoting; separators and line breaks are flattened.
fn official_cell(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            ';' => ',',
            '\n' | '\r' => ' ',
            other => other,
        })
        .collect()
}

fn yes_no(flag: bool) -> String {
    if flag { "oui" } else { "non" }.to_string()
}

/// Minor units rendered as a decimal amount, e.g. `1050` → `10.50`.
pub fn format_amount(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
