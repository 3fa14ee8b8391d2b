//! Plain-text presentation: tables, metric cards and detail blocks.
//!
//! Everything here returns a `String` so commands decide where it goes and
//! tests can assert on the exact layout.

use crate::filters::FilterCriteria;
use crate::projection::{Summary, AT_RISK_SCORE, HIGH_YIELD_CLIENT_SCORE, HOT_LEAD_SCORE};
use crate::types::{
    AutomationPack, Client, ClientHierarchy, FunnelMetrics, GeoSummary, HierarchyBranch, Lead,
    ScoreHistory, ScoringConfig, TicketStats,
};
use crate::util::truncate_chars;

pub const NO_RECORDS: &str = "No records found";

const MAX_CELL_CHARS: usize = 40;

/// Left-aligned table with a dashed rule under the header.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return NO_RECORDS.to_string();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|c| truncate_chars(c, MAX_CELL_CHARS)).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let format_row = |values: Vec<&str>| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = Vec::with_capacity(cells.len() + 2);
    lines.push(format_row(headers.to_vec()));
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in &cells {
        lines.push(format_row(row.iter().map(String::as_str).collect()));
    }
    lines.join("\n")
}

/// One `label: value` card per line, labels padded to the same width.
pub fn metric_cards(cards: &[(&str, String)]) -> String {
    let width = cards.iter().map(|(l, _)| l.chars().count()).max().unwrap_or(0);
    cards
        .iter()
        .map(|(label, value)| format!("{:<width$}  {}", label, value, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}

fn score(value: f64) -> String {
    format!("{:.1}", value)
}

fn or_dash(value: Option<&str>) -> String {
    value.filter(|v| !v.is_empty()).unwrap_or("-").to_string()
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

pub fn filter_badge(criteria: &FilterCriteria) -> String {
    match criteria.active_count() {
        0 => "Filters: none".to_string(),
        n => format!("Filters ({})", n),
    }
}

pub fn filter_details(criteria: &FilterCriteria) -> String {
    let join = |set: &std::collections::BTreeSet<String>| {
        if set.is_empty() {
            "all".to_string()
        } else {
            set.iter().cloned().collect::<Vec<_>>().join(", ")
        }
    };
    metric_cards(&[
        ("Sectors", join(&criteria.sectors)),
        ("Regions", join(&criteria.regions)),
        (
            "Score range",
            format!("{}-{}", criteria.min_score, criteria.max_score),
        ),
        (
            "Search",
            if criteria.search_query.is_empty() {
                "-".to_string()
            } else {
                format!("\"{}\"", criteria.search_query)
            },
        ),
    ])
}

// ---------------------------------------------------------------------------
// Leads and clients
// ---------------------------------------------------------------------------

pub fn lead_table(leads: &[&Lead]) -> String {
    let rows: Vec<Vec<String>> = leads
        .iter()
        .map(|l| {
            vec![
                l.id.to_string(),
                l.company.clone(),
                l.sector.clone(),
                or_dash(l.region.as_deref()),
                score(l.lead_score),
                or_dash(Some(l.status.as_str())),
                or_dash(Some(l.suggested_next_action.as_str())),
            ]
        })
        .collect();
    table(
        &["ID", "Company", "Sector", "Region", "Score", "Status", "Next action"],
        &rows,
    )
}

pub fn lead_summary(summary: &Summary) -> String {
    metric_cards(&[
        ("Leads", summary.count.to_string()),
        ("Average score", score(summary.average_score)),
        (
            "Hot targets",
            format!("{} (score >= {})", summary.high_score_count, HOT_LEAD_SCORE),
        ),
        ("By sector", sector_breakdown(summary)),
    ])
}

pub fn client_table(clients: &[&Client]) -> String {
    let rows: Vec<Vec<String>> = clients
        .iter()
        .map(|c| {
            vec![
                c.id.to_string(),
                c.company.clone(),
                c.sector.clone(),
                or_dash(c.region.as_deref()),
                score(c.upsell_score),
                score(c.risk_score),
                if c.recommended_packs.is_empty() {
                    "-".to_string()
                } else {
                    c.recommended_packs.join(" ")
                },
            ]
        })
        .collect();
    table(
        &["ID", "Company", "Sector", "Region", "Upsell", "Risk", "Packs"],
        &rows,
    )
}

pub fn client_summary(summary: &Summary) -> String {
    metric_cards(&[
        ("Clients", summary.count.to_string()),
        ("Average upsell", score(summary.average_score)),
        (
            "High yield",
            format!(
                "{} (score >= {})",
                summary.high_score_count, HIGH_YIELD_CLIENT_SCORE
            ),
        ),
        (
            "At risk",
            format!("{} (risk >= {})", summary.at_risk_count, AT_RISK_SCORE),
        ),
        ("By sector", sector_breakdown(summary)),
    ])
}

fn sector_breakdown(summary: &Summary) -> String {
    if summary.sector_counts.is_empty() {
        return "-".to_string();
    }
    summary
        .sector_counts
        .iter()
        .map(|(sector, count)| format!("{} {}", sector, count))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The expansion-targets panel: id, company and score of each target.
pub fn targets_panel(title: &str, targets: &[(i64, &str, f64)]) -> String {
    let mut out = format!("{}\n", title);
    if targets.is_empty() {
        out.push_str(NO_RECORDS);
        return out;
    }
    let lines: Vec<String> = targets
        .iter()
        .map(|(id, company, s)| format!("  #{:<5} {:<30} {}", id, truncate_chars(company, 30), score(*s)))
        .collect();
    out.push_str(&lines.join("\n"));
    out
}

pub fn lead_detail(lead: &Lead) -> String {
    let mut cards = vec![
        ("Lead", format!("#{} {}", lead.id, lead.company)),
        ("Contact", lead.name.clone()),
        ("Email", or_dash(lead.email.as_deref())),
        ("Phone", or_dash(lead.phone.as_deref())),
        ("Sector", lead.sector.clone()),
        ("Size", or_dash(Some(lead.size.as_str()))),
        ("Source", or_dash(Some(lead.source.as_str()))),
        (
            "Location",
            match (lead.city.as_deref(), lead.region.as_deref()) {
                (Some(c), Some(r)) => format!("{}, {}", c, r),
                (c, r) => or_dash(c.or(r)),
            },
        ),
        ("Score", score(lead.lead_score)),
        ("Status", or_dash(Some(lead.status.as_str()))),
        ("Next action", or_dash(Some(lead.suggested_next_action.as_str()))),
    ];
    if let Some(client_id) = lead.client_id {
        cards.push(("Converted to", format!("client #{}", client_id)));
    }
    let mut out = metric_cards(&cards);
    if let Some(breakdown) = &lead.score_breakdown {
        out.push_str("\n\nScore breakdown\n");
        out.push_str(&breakdown_lines(breakdown));
    }
    out
}

pub fn client_detail(client: &Client) -> String {
    let mut cards = vec![
        ("Client", format!("#{} {}", client.id, client.company)),
        ("Owner", client.name.clone()),
        ("Sector", client.sector.clone()),
        ("Size", or_dash(Some(client.size.as_str()))),
        ("Region", or_dash(client.region.as_deref())),
        ("Upsell score", score(client.upsell_score)),
        ("Risk score", score(client.risk_score)),
        ("Risk flag", or_dash(client.risk_flag.as_deref())),
        (
            "Recommended",
            if client.recommended_packs.is_empty() {
                "-".to_string()
            } else {
                client.recommended_packs.join(", ")
            },
        ),
    ];
    if let Some(parent) = client.parent_id {
        cards.push(("Parent", format!("client #{}", parent)));
    }
    if let Some(origin) = client.origin_lead_id {
        cards.push(("From lead", format!("#{}", origin)));
    }
    let mut out = metric_cards(&cards);
    if let Some(breakdown) = &client.score_breakdown {
        out.push_str("\n\nScore breakdown\n");
        out.push_str(&breakdown_lines(breakdown));
    }
    out
}

fn breakdown_lines(breakdown: &std::collections::BTreeMap<String, f64>) -> String {
    let owned: Vec<(String, String)> = breakdown
        .iter()
        .map(|(k, v)| (format!("  {}", k), score(*v)))
        .collect();
    let cards: Vec<(&str, String)> = owned.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
    metric_cards(&cards)
}

pub fn score_history(entries: &[ScoreHistory]) -> String {
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|h| vec![h.recorded_at.clone(), score(h.score)])
        .collect();
    table(&["Recorded", "Score"], &rows)
}

pub fn hierarchy(h: &ClientHierarchy) -> String {
    let mut out = String::new();
    if let Some(parent) = &h.parent {
        out.push_str(&format!(
            "Parent: #{} {} ({})\n",
            parent.id,
            parent.company,
            parent.score.map(score).unwrap_or_else(|| "-".to_string())
        ));
    }
    out.push_str(&format!(
        "Group: {} branches, primary region {}\n\n",
        h.group_metrics.total_branches,
        or_dash(Some(h.group_metrics.primary_region.as_str()))
    ));
    push_branch(&mut out, &h.tree, 0);
    if !h.siblings.is_empty() {
        out.push_str("\nSiblings\n");
        for s in &h.siblings {
            out.push_str(&format!(
                "  #{} {} {} ({})\n",
                s.id,
                s.company,
                s.location,
                s.score.map(score).unwrap_or_else(|| "-".to_string())
            ));
        }
    }
    out.trim_end().to_string()
}

fn push_branch(out: &mut String, branch: &HierarchyBranch, depth: usize) {
    let marker = if branch.is_current { " *" } else { "" };
    out.push_str(&format!(
        "{}#{} {} [{}] {}{}\n",
        "  ".repeat(depth),
        branch.id,
        branch.company,
        [branch.city.as_str(), branch.region.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(", "),
        branch.score.map(score).unwrap_or_else(|| "-".to_string()),
        marker
    ));
    for child in &branch.sub_branches {
        push_branch(out, child, depth + 1);
    }
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

pub fn packs(packs: &[AutomationPack]) -> String {
    let rows: Vec<Vec<String>> = packs
        .iter()
        .map(|p| {
            vec![
                p.code.clone(),
                p.name.clone(),
                or_dash(p.price_band.as_deref()),
                p.installation_count.to_string(),
                p.potential_count.to_string(),
            ]
        })
        .collect();
    table(&["Code", "Pack", "Price", "Installed", "Potential"], &rows)
}

pub fn ticket_stats(stats: &TicketStats) -> String {
    let mut out = metric_cards(&[
        ("Total tickets", stats.total().to_string()),
        ("Open", stats.status_count("open").to_string()),
        ("Resolved", stats.status_count("resolved").to_string()),
    ]);

    let by_type: Vec<Vec<String>> = stats
        .by_type
        .iter()
        .map(|t| vec![t.ticket_type.clone(), t.count.to_string()])
        .collect();
    out.push_str("\n\n");
    out.push_str(&table(&["Type", "Count"], &by_type));

    let by_severity: Vec<Vec<String>> = stats
        .by_severity
        .iter()
        .map(|s| vec![s.severity.clone(), s.count.to_string()])
        .collect();
    out.push_str("\n\n");
    out.push_str(&table(&["Severity", "Count"], &by_severity));

    if !stats.top_clients.is_empty() {
        let top: Vec<Vec<String>> = stats
            .top_clients
            .iter()
            .map(|c| vec![c.company.clone(), c.ticket_count.to_string()])
            .collect();
        out.push_str("\n\n");
        out.push_str(&table(&["Client", "Tickets"], &top));
    }
    out
}

pub fn geo_summary(summary: &GeoSummary) -> String {
    let mut states: Vec<_> = summary.states.values().collect();
    states.sort_by(|a, b| {
        b.opportunity_density
            .partial_cmp(&a.opportunity_density)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let rows: Vec<Vec<String>> = states
        .iter()
        .map(|s| {
            vec![
                s.name.clone(),
                s.region.clone(),
                s.lead_count.to_string(),
                s.client_count.to_string(),
                score(s.avg_lead_score),
                format!("{:.2}", s.opportunity_density),
                format!("{:?}", s.risk_level).to_uppercase(),
                s.recommended_action.clone(),
            ]
        })
        .collect();

    let mut out = table(
        &["State", "Region", "Leads", "Clients", "Avg", "Density", "Risk", "Action"],
        &rows,
    );
    if summary.unmapped.count > 0 {
        out.push_str(&format!(
            "\n\n{} records without a mapped state",
            summary.unmapped.count
        ));
    }
    out
}

pub fn funnel(funnel: &FunnelMetrics) -> String {
    let mut out = metric_cards(&[
        ("Total leads", funnel.total_leads.to_string()),
        ("Active", funnel.active_leads().to_string()),
        ("Won", funnel.won_count.to_string()),
        (
            "Conversion",
            format!("{:.1}%", funnel.conversion_efficiency),
        ),
    ]);
    let max = funnel.stages.iter().map(|s| s.count).max().unwrap_or(0).max(1);
    let stages: Vec<Vec<String>> = funnel
        .stages
        .iter()
        .map(|s| {
            let bar = "#".repeat(((s.count.max(0) * 30) / max) as usize);
            vec![s.stage.clone(), s.count.to_string(), bar]
        })
        .collect();
    out.push_str("\n\n");
    out.push_str(&table(&["Stage", "Count", ""], &stages));
    out
}

pub fn scoring_configs(configs: &[ScoringConfig]) -> String {
    let rows: Vec<Vec<String>> = configs
        .iter()
        .map(|c| {
            vec![
                c.key.clone(),
                or_dash(Some(c.category.as_str())),
                or_dash(Some(c.label.as_str())),
                format!("{}", c.value),
            ]
        })
        .collect();
    table(&["Key", "Category", "Label", "Value"], &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::project;
    use serde_json::json;

    fn leads() -> Vec<Lead> {
        serde_json::from_value(json!([
            {"id": 1, "name": "Asha", "company": "Acme Tools", "sector": "manufacturing",
             "region": "Gujarat", "lead_score": 82.0, "status": "new"},
            {"id": 2, "name": "Ravi", "company": "Shree", "sector": "trading",
             "lead_score": 40.0, "status": "contacted"}
        ]))
        .unwrap()
    }

    #[test]
    fn test_empty_table_prints_no_records() {
        assert_eq!(table(&["A"], &[]), NO_RECORDS);
        assert_eq!(lead_table(&[]), NO_RECORDS);
    }

    #[test]
    fn test_table_alignment() {
        let out = table(
            &["ID", "Name"],
            &[
                vec!["1".into(), "Acme".into()],
                vec!["22".into(), "B".into()],
            ],
        );
        assert_eq!(out, "ID  Name\n--  ----\n1   Acme\n22  B");
    }

    #[test]
    fn test_lead_table_and_summary() {
        let records = leads();
        let view = project(&records, &FilterCriteria::empty());
        let out = lead_table(&view.records);
        assert!(out.contains("Acme Tools"));
        assert!(out.lines().nth(3).unwrap().contains("-"));

        let cards = lead_summary(&view.summary);
        assert!(cards.contains("Leads          2"));
        assert!(cards.contains("Average score  61.0"));
        assert!(cards.contains("Hot targets    1 (score >= 75)"));
        assert!(cards.contains("manufacturing 1, trading 1"));
    }

    #[test]
    fn test_filter_badge() {
        assert_eq!(filter_badge(&FilterCriteria::empty()), "Filters: none");
        let criteria = FilterCriteria::empty()
            .with_sectors(["services"])
            .with_score_range(50, 100);
        assert_eq!(filter_badge(&criteria), "Filters (2)");
        assert!(filter_details(&criteria).contains("Score range  50-100"));
    }

    #[test]
    fn test_targets_panel_empty() {
        assert_eq!(targets_panel("Expansion targets", &[]), "Expansion targets\nNo records found");
    }
}
