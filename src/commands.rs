// Command handlers for the `tcis` binary.
//
// Handlers return the text to print so they can be exercised against a test
// backend; only `watch` writes to the terminal directly.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::api::client::LeadQuery;
use crate::cli::{
    ClientCommand, Cli, Command, ConfigCommand, ExportArgs, ExportFormat, ExportTarget,
    FiltersCommand, HistoryArgs, LeadCommand, LeadFields, ListArgs,
};
use crate::error::ApiError;
use crate::export::{export_to_csv, export_to_json};
use crate::filters::FilterCriteria;
use crate::notification::TerminalSink;
use crate::poller::{LeadPoller, PollerConfig};
use crate::projection::{project, sort_view, top_targets, TARGET_SCORE};
use crate::render;
use crate::state::AppState;
use crate::types::EntityKind;
use crate::url_sync::{parse_query, share_link, to_query};
use crate::validation::{ClientForm, ConversionForm, LeadForm, LeadUpdate};

const TARGETS_PANEL_SIZE: usize = 5;

/// Run one CLI invocation against `state`.
///
/// Persisted filters are loaded first; `--filters` replaces them for this and
/// later runs. Whatever the command leaves in the store is persisted at the
/// end.
pub async fn execute(state: &AppState, cli: Cli) -> Result<(), ApiError> {
    let sync = state.url_sync();
    sync.load();
    if let Some(query) = cli.filters.as_deref() {
        state.filters.apply(parse_query(query));
    }

    let output = match cli.command {
        Command::Leads(args) => list_leads(state, &args).await?,
        Command::Clients(args) => list_clients(state, &args).await?,
        Command::Filters { command } => filters(state, command)?,
        Command::Lead { command } => lead(state, command).await?,
        Command::Client { command } => client(state, command).await?,
        Command::Packs => render::packs(&state.dashboard.potential_packs().await?),
        Command::Tickets => render::ticket_stats(&*state.dashboard.ticket_stats().await?),
        Command::Geo { sector } => {
            render::geo_summary(&*state.dashboard.geo_summary(sector.as_deref()).await?)
        }
        Command::Funnel => render::funnel(&*state.dashboard.funnel().await?),
        Command::Config { command } => scoring_config(state, command).await?,
        Command::Export(args) => export(state, &args).await?,
        Command::Watch => {
            watch(state).await?;
            String::new()
        }
        Command::SimulateLead(fields) => simulate_lead(state, fields).await?,
    };

    if !output.is_empty() {
        println!("{}", output);
    }

    if sync.persist(&state.filters.criteria())? {
        log::debug!("Persisted filters");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Lists
// ---------------------------------------------------------------------------

fn lead_query(args: &ListArgs) -> LeadQuery {
    LeadQuery {
        limit: args.limit,
        state: args.state.clone(),
        ..LeadQuery::default()
    }
}

pub async fn list_leads(state: &AppState, args: &ListArgs) -> Result<String, ApiError> {
    let leads = state.dashboard.ranked_leads(&lead_query(args)).await?;
    let criteria = state.filters.criteria();
    let mut view = project(leads.as_slice(), &criteria);
    sort_view(&mut view, args.sort.into(), args.sort_order());

    Ok(format!(
        "{}\n\n{}\n\n{}",
        render::filter_badge(&criteria),
        render::lead_table(&view.records),
        render::lead_summary(&view.summary)
    ))
}

pub async fn list_clients(state: &AppState, args: &ListArgs) -> Result<String, ApiError> {
    let clients = state.dashboard.ranked_clients().await?;
    let criteria = state.filters.criteria();
    let mut view = project(clients.as_slice(), &criteria);
    sort_view(&mut view, args.sort.into(), args.sort_order());
    if let Some(limit) = args.limit {
        view.records.truncate(limit as usize);
    }

    let targets: Vec<(i64, &str, f64)> = top_targets(clients.as_slice(), TARGET_SCORE)
        .into_iter()
        .take(TARGETS_PANEL_SIZE)
        .map(|c| (c.id, c.company.as_str(), c.upsell_score))
        .collect();

    Ok(format!(
        "{}\n\n{}\n\n{}\n\n{}",
        render::filter_badge(&criteria),
        render::client_table(&view.records),
        render::client_summary(&view.summary),
        render::targets_panel("Expansion targets", &targets)
    ))
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

fn filters(state: &AppState, command: FiltersCommand) -> Result<String, ApiError> {
    let store = &state.filters;
    match command {
        FiltersCommand::Show => {}
        FiltersCommand::Set {
            sectors,
            regions,
            min,
            max,
            q,
        } => {
            if let Some(sectors) = sectors {
                store.set_sectors(sectors);
            }
            if let Some(regions) = regions {
                store.set_regions(regions);
            }
            if min.is_some() || max.is_some() {
                let current = store.criteria();
                store.set_score_range(
                    min.unwrap_or(current.min_score as i64),
                    max.unwrap_or(current.max_score as i64),
                );
            }
            if let Some(q) = q {
                store.set_search_query(q);
            }
        }
        FiltersCommand::Reset => store.reset_filters(),
        FiltersCommand::Link => {
            return share_link(&state.config.share_base_url, &store.criteria());
        }
    }
    Ok(describe_filters(&store.criteria()))
}

fn describe_filters(criteria: &FilterCriteria) -> String {
    let query = to_query(criteria);
    format!(
        "{}\n{}\n\nQuery: {}",
        render::filter_badge(criteria),
        render::filter_details(criteria),
        if query.is_empty() { "(none)" } else { query.as_str() }
    )
}

// ---------------------------------------------------------------------------
// Leads and clients
// ---------------------------------------------------------------------------

impl From<LeadFields> for LeadForm {
    fn from(fields: LeadFields) -> Self {
        LeadForm {
            company: fields.company,
            name: fields.name,
            email: fields.email,
            phone: fields.phone,
            sector: fields.sector,
            size: fields.size,
            source: fields.source,
            city: fields.city,
            region: fields.region,
            interested_modules: fields.modules,
            notes: fields.notes,
        }
        .normalized()
    }
}

async fn lead(state: &AppState, command: LeadCommand) -> Result<String, ApiError> {
    let dashboard = &state.dashboard;
    match command {
        LeadCommand::Show { id } => Ok(render::lead_detail(&*dashboard.lead(id).await?)),
        LeadCommand::Create(fields) => {
            let lead = dashboard.create_lead(&LeadForm::from(fields)).await?;
            Ok(format!(
                "Lead #{} created ({}, score {:.1})",
                lead.id, lead.company, lead.lead_score
            ))
        }
        LeadCommand::Update {
            id,
            name,
            company,
            email,
            phone,
            sector,
            size,
            source,
            status,
            notes,
        } => {
            let update = LeadUpdate {
                name,
                company,
                email,
                phone,
                sector,
                size,
                source,
                status,
                notes,
            };
            let lead = dashboard.update_lead(id, &update).await?;
            Ok(format!("Lead #{} updated\n\n{}", lead.id, render::lead_detail(&lead)))
        }
        LeadCommand::Convert {
            id,
            products,
            account_manager,
            notes,
        } => {
            let form = ConversionForm {
                account_manager,
                initial_products: products,
                notes,
            };
            let result = dashboard.convert_lead(id, &form).await?;
            Ok(match result.client_id {
                Some(client_id) => format!("Lead #{} converted to client #{}", id, client_id),
                None => format!("Lead #{} converted", id),
            })
        }
        LeadCommand::History(args) => history(state, EntityKind::Lead, args).await,
    }
}

async fn client(state: &AppState, command: ClientCommand) -> Result<String, ApiError> {
    let dashboard = &state.dashboard;
    match command {
        ClientCommand::Show { id } => {
            Ok(render::client_detail(&*dashboard.client_record(id).await?))
        }
        ClientCommand::Create {
            company,
            name,
            email,
            phone,
            sector,
            size,
            city,
            region,
            products,
            revenue_band,
            account_manager,
            notes,
        } => {
            let form = ClientForm {
                company,
                name,
                email,
                phone,
                sector,
                size,
                city,
                region,
                existing_products: products,
                annual_revenue_band: revenue_band,
                account_manager,
                notes,
            }
            .normalized();
            let client = dashboard.create_client(&form).await?;
            Ok(format!("Client #{} created ({})", client.id, client.company))
        }
        ClientCommand::Hierarchy { id } => {
            Ok(render::hierarchy(&*dashboard.client_hierarchy(id).await?))
        }
        ClientCommand::History(args) => history(state, EntityKind::Client, args).await,
    }
}

async fn history(state: &AppState, kind: EntityKind, args: HistoryArgs) -> Result<String, ApiError> {
    let entries = state
        .dashboard
        .score_history(kind, args.id, args.limit, args.days)
        .await?;
    Ok(format!(
        "Score history for {} #{}\n\n{}",
        kind.as_str(),
        args.id,
        render::score_history(&entries)
    ))
}

// ---------------------------------------------------------------------------
// Scoring config, export, live alerts
// ---------------------------------------------------------------------------

async fn scoring_config(state: &AppState, command: ConfigCommand) -> Result<String, ApiError> {
    match command {
        ConfigCommand::List => Ok(render::scoring_configs(
            &state.dashboard.scoring_configs().await?,
        )),
        ConfigCommand::Set { key, value } => {
            let updated = state.dashboard.update_scoring_config(&key, value).await?;
            Ok(format!("{} = {}", updated.key, updated.value))
        }
    }
}

pub async fn export(state: &AppState, args: &ExportArgs) -> Result<String, ApiError> {
    let criteria = state.filters.criteria();
    let dir = state.export_dir();

    let (written, count) = match args.target {
        ExportTarget::Leads => {
            let leads = state.dashboard.ranked_leads(&LeadQuery::default()).await?;
            let view = project(leads.as_slice(), &criteria);
            let name = args.name.as_deref().unwrap_or("tcis_leads");
            (write_export(&view.records, name, &dir, args.format)?, view.records.len())
        }
        ExportTarget::Clients => {
            let clients = state.dashboard.ranked_clients().await?;
            let view = project(clients.as_slice(), &criteria);
            let name = args.name.as_deref().unwrap_or("tcis_clients");
            (write_export(&view.records, name, &dir, args.format)?, view.records.len())
        }
    };

    Ok(match written {
        Some(path) => format!("Exported {} records to {}", count, path.display()),
        None => "No records to export".to_string(),
    })
}

fn write_export<T: serde::Serialize>(
    records: &[T],
    name: &str,
    dir: &std::path::Path,
    format: ExportFormat,
) -> Result<Option<std::path::PathBuf>, ApiError> {
    match format {
        ExportFormat::Csv => export_to_csv(records, name, dir),
        ExportFormat::Json => export_to_json(records, name, dir).map(Some),
    }
}

async fn watch(state: &AppState) -> Result<(), ApiError> {
    let source = Arc::clone(state.dashboard.client());
    let handle = LeadPoller::spawn(
        source,
        Arc::new(TerminalSink),
        PollerConfig::from_config(&state.config),
    );
    println!(
        "Watching for new leads every {}s. Press Enter to dismiss, Ctrl-C to stop.",
        state.config.poll_interval_secs.max(1)
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let interrupted = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => break signal,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(_)) => handle.dismiss(),
                Ok(None) => stdin_open = false,
                Err(e) => {
                    log::warn!("Watch: stdin closed: {}", e);
                    stdin_open = false;
                }
            },
        }
    };
    handle.stop().await;
    interrupted.map_err(ApiError::from)
}

async fn simulate_lead(state: &AppState, fields: LeadFields) -> Result<String, ApiError> {
    let form = LeadForm::from(fields);
    let lead = state.dashboard.submit_external_lead(&form).await?;
    Ok(format!(
        "Submitted lead #{} ({}) through the external channel",
        lead.id, lead.company
    ))
}
