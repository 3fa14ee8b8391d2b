use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::projection::{SortKey, SortOrder};

#[derive(Debug, Parser)]
#[command(name = "tcis")]
#[command(about = "TCIS lead and client intelligence from the terminal")]
#[command(version)]
#[command(
    after_help = "Environment:\n  TCIS_API_BASE_URL  Backend base URL override\n  TCIS_API_KEY       API key for authenticated channels\n  RUST_LOG           Log filter (default: info)"
)]
pub struct Cli {
    /// Filter query applied for this run, e.g. "sectors=trading&minScore=60".
    /// Replaces the persisted filters.
    #[arg(long, global = true)]
    pub filters: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ranked leads under the current filters
    Leads(ListArgs),
    /// Ranked clients under the current filters
    Clients(ListArgs),
    /// Show, change or share the persisted filters
    Filters {
        #[command(subcommand)]
        command: FiltersCommand,
    },
    Lead {
        #[command(subcommand)]
        command: LeadCommand,
    },
    Client {
        #[command(subcommand)]
        command: ClientCommand,
    },
    /// Automation packs with their install base and potential
    Packs,
    /// Support ticket breakdown
    Tickets,
    /// Growth zones by state
    Geo {
        #[arg(long)]
        sector: Option<String>,
    },
    /// Pipeline funnel
    Funnel,
    /// Scoring weights
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Export the filtered leads or clients for CRM import
    Export(ExportArgs),
    /// Poll for new leads until interrupted
    Watch,
    /// Submit a lead through the authenticated external channel
    SimulateLead(LeadFields),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long, value_enum, default_value_t = SortField::Score)]
    pub sort: SortField,
    /// Ascending order (default is descending)
    #[arg(long, default_value_t = false)]
    pub asc: bool,
    #[arg(long)]
    pub limit: Option<u32>,
    /// Backend-side state drill-down
    #[arg(long)]
    pub state: Option<String>,
}

impl ListArgs {
    pub fn sort_order(&self) -> SortOrder {
        if self.asc {
            SortOrder::Ascending
        } else {
            SortOrder::Descending
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortField {
    Score,
    Company,
    Id,
}

impl From<SortField> for SortKey {
    fn from(field: SortField) -> Self {
        match field {
            SortField::Score => SortKey::Score,
            SortField::Company => SortKey::Company,
            SortField::Id => SortKey::Id,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum FiltersCommand {
    Show,
    Set {
        /// Comma-separated sectors
        #[arg(long, value_delimiter = ',')]
        sectors: Option<Vec<String>>,
        /// Comma-separated regions
        #[arg(long, value_delimiter = ',')]
        regions: Option<Vec<String>>,
        #[arg(long, allow_negative_numbers = true)]
        min: Option<i64>,
        #[arg(long, allow_negative_numbers = true)]
        max: Option<i64>,
        #[arg(long)]
        q: Option<String>,
    },
    Reset,
    /// Print a shareable link for the current filters
    Link,
}

#[derive(Debug, Args)]
pub struct LeadFields {
    #[arg(long)]
    pub company: String,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long, default_value = "services")]
    pub sector: String,
    #[arg(long, default_value = "small")]
    pub size: String,
    #[arg(long, default_value = "cold")]
    pub source: String,
    #[arg(long)]
    pub city: Option<String>,
    #[arg(long)]
    pub region: Option<String>,
    #[arg(long)]
    pub modules: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum LeadCommand {
    Show {
        id: i64,
    },
    Create(LeadFields),
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        sector: Option<String>,
        #[arg(long)]
        size: Option<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    Convert {
        id: i64,
        #[arg(long, default_value = "tallyprime")]
        products: String,
        #[arg(long)]
        account_manager: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    History(HistoryArgs),
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    pub id: i64,
    #[arg(long)]
    pub limit: Option<u32>,
    #[arg(long)]
    pub days: Option<u32>,
}

#[derive(Debug, Subcommand)]
pub enum ClientCommand {
    Show {
        id: i64,
    },
    Create {
        #[arg(long)]
        company: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long, default_value = "services")]
        sector: String,
        #[arg(long, default_value = "small")]
        size: String,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        products: Option<String>,
        #[arg(long, default_value = "50k-2L")]
        revenue_band: String,
        #[arg(long)]
        account_manager: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    Hierarchy {
        id: i64,
    },
    History(HistoryArgs),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    List,
    Set { key: String, value: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportTarget {
    Leads,
    Clients,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[arg(value_enum)]
    pub target: ExportTarget,
    #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
    pub format: ExportFormat,
    /// File name stem; defaults to tcis_leads / tcis_clients
    #[arg(long)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_filters_set() {
        let cli = Cli::try_parse_from([
            "tcis",
            "filters",
            "set",
            "--sectors",
            "trading,services",
            "--min",
            "-5",
        ])
        .unwrap();
        match cli.command {
            Command::Filters {
                command: FiltersCommand::Set { sectors, min, .. },
            } => {
                assert_eq!(sectors, Some(vec!["trading".to_string(), "services".to_string()]));
                assert_eq!(min, Some(-5));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_filters_flag() {
        let cli = Cli::try_parse_from(["tcis", "leads", "--filters", "minScore=70", "--sort", "company"])
            .unwrap();
        assert_eq!(cli.filters.as_deref(), Some("minScore=70"));
        match cli.command {
            Command::Leads(args) => {
                assert_eq!(args.sort, SortField::Company);
                assert_eq!(args.sort_order(), SortOrder::Descending);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_export_args() {
        let cli = Cli::try_parse_from(["tcis", "export", "clients", "--format", "json"]).unwrap();
        match cli.command {
            Command::Export(args) => {
                assert_eq!(args.target, ExportTarget::Clients);
                assert_eq!(args.format, ExportFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
