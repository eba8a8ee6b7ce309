use crate::api::{self, ApiConfig, ProspectApi};
use crate::engine::{BatchHandle, SendingOrchestrator};
use crate::model::{
    BatchState, CampaignStatus, Contact, CreateCampaignRequest, ListCampaignsQuery,
    ListPlacesQuery, ListRecipientsQuery, Pacing, RecipientStatus, SearchRequest,
};
use crate::orchestrator::{self, ReportTargets, UiCommand, UiEvent};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "prospect-manager",
    version,
    about = "Prospect Manager client: search businesses, browse prospects and campaigns, send WhatsApp batches"
)]
pub struct Cli {
    /// Base URL of the Prospect Manager API
    #[arg(long, env = "PROSPECT_API_URL", default_value = api::DEFAULT_API_URL, global = true)]
    pub api_url: String,

    /// Access key (overrides the key stored by `login`)
    #[arg(long, env = "PROSPECT_ACCESS_KEY", hide_env_values = true, global = true)]
    pub access_key: Option<String>,

    /// HTTP request timeout
    #[arg(long, default_value = "30s", global = true)]
    pub timeout: humantime::Duration,

    /// Write logs to this file (RUST_LOG controls the level)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Validate an access key and store it for later runs
    Login { key: String },
    /// Forget the stored access key
    Logout,
    /// List business niches
    Niches,
    /// Run a business search through the scraping backend
    Search(SearchArgs),
    /// List stored prospects
    Places(PlacesArgs),
    /// List message types available for campaigns
    MessageTypes,
    /// List templates of a message type
    Templates { message_type_id: String },
    /// List campaigns
    Campaigns(CampaignsArgs),
    /// Show one campaign
    Campaign(CampaignArgs),
    /// Create a server-side campaign for a set of places
    CreateCampaign(CreateCampaignArgs),
    /// Print the phone numbers of a campaign's recipients
    Phones(PhonesArgs),
    /// Send a WhatsApp message to a batch of prospects, one at a time
    Send(SendArgs),
    /// List saved batch reports
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Debug, Args, Clone)]
pub struct SearchArgs {
    #[arg(long)]
    pub query: String,
    #[arg(long)]
    pub niche: String,
}

/// Filters shared by `places` and `send`.
#[derive(Debug, Args, Clone, Default)]
pub struct PlaceFilters {
    #[arg(long)]
    pub state: Option<String>,
    #[arg(long)]
    pub city: Option<String>,
    #[arg(long)]
    pub has_website: Option<bool>,
    #[arg(long)]
    pub niche: Option<String>,
    #[arg(long)]
    pub first_message_sent: Option<bool>,
    /// Substring match on the primary category
    #[arg(long)]
    pub category: Option<String>,
    /// Skip prospects whose first message failed
    #[arg(long)]
    pub exclude_first_message_failed: bool,
}

impl PlaceFilters {
    fn to_query(&self, page: Option<u32>, page_size: Option<u32>) -> ListPlacesQuery {
        ListPlacesQuery {
            page,
            page_size,
            state: self.state.clone(),
            city: self.city.clone(),
            has_website: self.has_website,
            niche_searched: self.niche.clone(),
            first_message_sent: self.first_message_sent,
            google_primary_category_like: self.category.clone(),
            exclude_first_message_failed: self.exclude_first_message_failed.then_some(true),
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct PlacesArgs {
    #[command(flatten)]
    pub filters: PlaceFilters,
    #[arg(long, default_value_t = 1)]
    pub page: u32,
    #[arg(long, default_value_t = 20)]
    pub page_size: u32,
}

#[derive(Debug, Args, Clone)]
pub struct CampaignsArgs {
    #[arg(long, value_enum)]
    pub status: Option<CampaignStatus>,
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub external: Option<bool>,
    #[arg(long, default_value_t = 1)]
    pub page: u32,
    #[arg(long, default_value_t = 20)]
    pub page_size: u32,
}

#[derive(Debug, Args, Clone)]
pub struct CampaignArgs {
    pub id: String,
    /// Also list recipients
    #[arg(long)]
    pub recipients: bool,
    #[arg(long, value_enum)]
    pub recipient_status: Option<RecipientStatus>,
}

#[derive(Debug, Args, Clone)]
pub struct CreateCampaignArgs {
    /// Place ids to include (repeatable)
    #[arg(long = "place-id", required = true)]
    pub place_ids: Vec<String>,
    #[arg(long)]
    pub message_type_id: String,
    /// Display name used in the campaign name; looked up when omitted
    #[arg(long)]
    pub message_type_name: Option<String>,
    /// Interval preset (1-5); see `send --help` for the ranges
    #[arg(long, conflicts_with_all = ["interval_min", "interval_max"])]
    pub preset: Option<usize>,
    #[arg(long, default_value = "30s")]
    pub interval_min: humantime::Duration,
    #[arg(long, default_value = "2m")]
    pub interval_max: humantime::Duration,
    /// Phones notified by the backend when the campaign ends (repeatable)
    #[arg(long = "notify-phone")]
    pub notify_phones: Vec<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum PhoneFormat {
    E164,
    Digits,
}

#[derive(Debug, Args, Clone)]
pub struct PhonesArgs {
    pub campaign_id: String,
    #[arg(long, value_enum)]
    pub status: Option<RecipientStatus>,
    #[arg(long, value_enum, default_value = "e164")]
    pub format: PhoneFormat,
}

#[derive(Debug, Args, Clone)]
pub struct SendArgs {
    /// JSON file with an array of prospects; when omitted prospects come from the API
    #[arg(long)]
    pub contacts: Option<PathBuf>,

    #[command(flatten)]
    pub filters: PlaceFilters,

    /// Maximum number of prospects fetched from the API
    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Message text
    #[arg(long, conflicts_with = "message_file")]
    pub message: Option<String>,

    /// Read the message text from a file
    #[arg(long)]
    pub message_file: Option<PathBuf>,

    /// Fixed wait between two sends
    #[arg(long, default_value = "30s")]
    pub interval: humantime::Duration,

    /// Random wait between sends: lower bound (use with --interval-max).
    /// Presets: 30s-2m, 30s-3m, 1m-3m, 1m-5m, 1m-10m
    #[arg(long, requires = "interval_max")]
    pub interval_min: Option<humantime::Duration>,

    /// Random wait between sends: upper bound
    #[arg(long, requires = "interval_min")]
    pub interval_max: Option<humantime::Duration>,

    /// List the eligible contacts and exit without sending
    #[arg(long)]
    pub dry_run: bool,

    /// Print line-oriented progress instead of the TUI
    #[arg(long)]
    pub text: bool,

    /// Export the report as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Export the report as CSV
    #[arg(long)]
    pub export_csv: Option<PathBuf>,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,
}

impl SendArgs {
    pub fn pacing(&self) -> Pacing {
        match (&self.interval_min, &self.interval_max) {
            (Some(min), Some(max)) => Pacing::Range {
                min: **min,
                max: **max,
            },
            _ => Pacing::Fixed {
                interval: *self.interval,
            },
        }
    }

    pub fn report_targets(&self) -> ReportTargets<'_> {
        ReportTargets {
            auto_save: self.auto_save,
            export_json: self.export_json.as_deref(),
            export_csv: self.export_csv.as_deref(),
        }
    }
}

/// Whether this invocation hands the terminal to the TUI.
pub fn uses_terminal_ui(args: &Cli) -> bool {
    cfg!(feature = "tui")
        && matches!(&args.command, Command::Send(s) if !s.text && !s.dry_run && !args.json)
}

/// Build the API configuration from flags, environment and the stored key.
pub fn build_api_config(args: &Cli) -> Result<ApiConfig> {
    let key_path = crate::credentials::default_path()?;
    let access_key = crate::credentials::resolve(args.access_key.as_deref(), &key_path)?;
    Ok(ApiConfig {
        base_url: args.api_url.clone(),
        access_key,
        timeout: *args.timeout,
        ..Default::default()
    })
}

fn client(args: &Cli) -> Result<ProspectApi> {
    let cfg = build_api_config(args)?;
    ProspectApi::new(&cfg).context("build API client")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn or_dash(v: Option<&str>) -> &str {
    v.filter(|s| !s.is_empty()).unwrap_or("-")
}

pub async fn run(args: Cli) -> Result<()> {
    match args.command.clone() {
        Command::Login { key } => login(&args, &key).await,
        Command::Logout => {
            let path = crate::credentials::default_path()?;
            if crate::credentials::clear(&path)? {
                println!("Access key removed");
            } else {
                println!("No stored access key");
            }
            Ok(())
        }
        Command::Niches => {
            let niches = client(&args)?.list_niches().await?;
            if args.json {
                return print_json(&niches);
            }
            for n in niches {
                println!("{:<24} {}", n.standardized_name, n.display_name);
            }
            Ok(())
        }
        Command::Search(s) => {
            let resp = client(&args)?
                .search_businesses(&SearchRequest {
                    query: s.query,
                    niche: s.niche,
                })
                .await?;
            if args.json {
                return print_json(&resp);
            }
            println!(
                "Fetched {} | new {} | existing {} | enriched {} | failed {} | pending {}",
                resp.total_fetched,
                resp.new_saved_count,
                resp.already_existing_count,
                resp.enriched_count,
                resp.failed_count,
                resp.pending_count
            );
            for item in resp.items {
                println!(
                    "{:<40} {:<16} {} / {}",
                    item.display_name,
                    or_dash(item.normalized_phone_e164.as_deref()),
                    or_dash(item.city.as_deref()),
                    or_dash(item.state.as_deref()),
                );
            }
            Ok(())
        }
        Command::Places(p) => {
            let query = p.filters.to_query(Some(p.page), Some(p.page_size));
            let resp = client(&args)?.list_places(&query).await?;
            if args.json {
                return print_json(&resp);
            }
            for item in &resp.items {
                let phone = Contact::from(item.clone())
                    .dispatch_phone()
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:<36} {:<40} {:<14} {:<5} {}",
                    item.id,
                    item.display_name,
                    phone,
                    if item.first_message_sent { "sent" } else { "new" },
                    or_dash(item.city.as_deref()),
                );
            }
            println!(
                "Page {}/{} ({} total)",
                resp.page, resp.total_pages, resp.total
            );
            Ok(())
        }
        Command::MessageTypes => {
            let types = client(&args)?.list_message_types().await?;
            if args.json {
                return print_json(&types);
            }
            for t in types {
                println!(
                    "{:<36} {:<30} {} template(s){}",
                    t.id,
                    t.name,
                    t.template_count,
                    if t.is_active { "" } else { " (inactive)" }
                );
            }
            Ok(())
        }
        Command::Templates { message_type_id } => {
            let templates = client(&args)?.list_templates(&message_type_id).await?;
            if args.json {
                return print_json(&templates);
            }
            for t in templates {
                println!("== {} ({})", t.title, t.id);
                println!("{}", t.content);
            }
            Ok(())
        }
        Command::Campaigns(c) => {
            let query = ListCampaignsQuery {
                page: Some(c.page),
                page_size: Some(c.page_size),
                status: c.status,
                search: c.search,
                is_external: c.external,
            };
            let resp = client(&args)?.list_campaigns(&query).await?;
            if args.json {
                return print_json(&resp);
            }
            for camp in &resp.items {
                println!(
                    "{:<36} {:<40} {:<12} {}/{} ok, {} failed, {} pending",
                    camp.id,
                    camp.name,
                    format!("{:?}", camp.status),
                    camp.success_count,
                    camp.total_recipients,
                    camp.failed_count,
                    camp.pending_count
                );
            }
            println!(
                "Page {}/{} ({} total)",
                resp.page, resp.total_pages, resp.total
            );
            Ok(())
        }
        Command::Campaign(c) => show_campaign(&args, c).await,
        Command::CreateCampaign(c) => create_campaign(&args, c).await,
        Command::Phones(p) => {
            let query = ListRecipientsQuery {
                status: p.status,
                page_size: Some(100),
                ..Default::default()
            };
            let recipients = client(&args)?
                .fetch_all_recipients(&p.campaign_id, &query)
                .await?;
            let phones = campaign_phones(
                recipients
                    .iter()
                    .filter_map(|r| r.place.normalized_phone_e164.as_deref()),
                p.format,
            );
            if args.json {
                return print_json(&phones);
            }
            println!("{}", phones.join(","));
            eprintln!("{} phone(s)", phones.len());
            Ok(())
        }
        Command::Send(s) => send(&args, s).await,
        Command::History { limit } => {
            let reports = crate::storage::load_recent(limit)?;
            if args.json {
                return print_json(&reports);
            }
            for r in reports {
                println!(
                    "{}  {:<9} {} ok / {} failed of {}  {}",
                    r.started_at_utc,
                    format!("{:?}", r.outcome),
                    r.success_count,
                    r.failure_count,
                    r.total_contacts,
                    r.pacing.describe()
                );
            }
            Ok(())
        }
    }
}

async fn login(args: &Cli, key: &str) -> Result<()> {
    let api = ProspectApi::new(&ApiConfig {
        base_url: args.api_url.clone(),
        timeout: *args.timeout,
        ..Default::default()
    })?;
    if !api
        .validate_access_key(key)
        .await
        .context("validate access key")?
    {
        bail!("access key invalid or not authorized");
    }
    let path = crate::credentials::default_path()?;
    crate::credentials::save(&path, key)?;
    println!("Access key valid; saved to {}", path.display());
    Ok(())
}

async fn show_campaign(args: &Cli, c: CampaignArgs) -> Result<()> {
    let api = client(args)?;
    let campaign = api.get_campaign(&c.id).await?;
    let recipients = if c.recipients {
        let query = ListRecipientsQuery {
            status: c.recipient_status,
            page_size: Some(100),
            ..Default::default()
        };
        Some(api.fetch_all_recipients(&c.id, &query).await?)
    } else {
        None
    };

    if args.json {
        return print_json(&serde_json::json!({
            "campaign": campaign,
            "recipients": recipients,
        }));
    }

    println!("{} ({})", campaign.name, campaign.id);
    println!(
        "Status: {:?}{}",
        campaign.status,
        if campaign.is_external { " (external)" } else { "" }
    );
    println!(
        "Recipients: {} | sent {} | failed {} | pending {}",
        campaign.total_recipients,
        campaign.success_count,
        campaign.failed_count,
        campaign.pending_count
    );
    if let (Some(min), Some(max)) = (campaign.interval_min, campaign.interval_max) {
        println!("Interval: {min}-{max}s");
    }
    println!(
        "Started: {}  Completed: {}",
        or_dash(campaign.started_at.as_deref()),
        or_dash(campaign.completed_at.as_deref())
    );
    for r in recipients.unwrap_or_default() {
        println!(
            "  {:<8} {:<40} {:<16} {}",
            format!("{:?}", r.status),
            r.place.display_name,
            or_dash(r.place.normalized_phone_e164.as_deref()),
            or_dash(r.error_message.as_deref()),
        );
    }
    Ok(())
}

async fn create_campaign(args: &Cli, c: CreateCampaignArgs) -> Result<()> {
    let api = client(args)?;
    let (interval_min, interval_max) = match c.preset {
        Some(n) => {
            let (_, min, max) = Pacing::PRESETS
                .get(n.wrapping_sub(1))
                .copied()
                .with_context(|| format!("preset must be 1-{}", Pacing::PRESETS.len()))?;
            (min, max)
        }
        None => (
            Duration::from(c.interval_min).as_secs(),
            Duration::from(c.interval_max).as_secs(),
        ),
    };
    if interval_max < interval_min {
        bail!("--interval-max must not be below --interval-min");
    }

    let type_name = match c.message_type_name {
        Some(n) => n,
        None => api
            .list_message_types()
            .await?
            .into_iter()
            .find(|t| t.id == c.message_type_id)
            .map(|t| t.name)
            .with_context(|| format!("unknown message type {}", c.message_type_id))?,
    };
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());

    let resp = api
        .create_campaign(&CreateCampaignRequest {
            place_ids: c.place_ids,
            message_type_id: c.message_type_id,
            interval_min,
            interval_max,
            name: api::campaign_name(&type_name, now),
            notify_phones: c.notify_phones,
        })
        .await?;
    if args.json {
        return print_json(&resp);
    }
    println!(
        "Campaign {} created ({:?}, {} recipients). {}",
        resp.campaign_id, resp.status, resp.total_recipients, resp.message
    );
    Ok(())
}

/// Normalize recipient phones to the requested format, dropping unusable ones.
fn campaign_phones<'a>(raw: impl Iterator<Item = &'a str>, format: PhoneFormat) -> Vec<String> {
    raw.filter_map(crate::phone::normalize)
        .map(|digits| match format {
            PhoneFormat::E164 => format!("+{digits}"),
            PhoneFormat::Digits => digits,
        })
        .collect()
}

fn load_message(s: &SendArgs) -> Result<String> {
    let text = match (&s.message, &s.message_file) {
        (Some(m), _) => m.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("read message file {}", path.display()))?,
        (None, None) => bail!("provide --message or --message-file"),
    };
    Ok(text.trim_end().to_string())
}

async fn load_contacts(args: &Cli, s: &SendArgs) -> Result<Vec<Contact>> {
    if let Some(path) = s.contacts.as_deref() {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read contacts file {}", path.display()))?;
        let contacts: Vec<Contact> = serde_json::from_str(&data)
            .with_context(|| format!("parse contacts file {}", path.display()))?;
        return Ok(contacts);
    }
    let mut query = s.filters.to_query(None, Some(s.limit.clamp(1, 100) as u32));
    // Batch sends target prospects that were never contacted unless asked otherwise.
    query.first_message_sent = query.first_message_sent.or(Some(false));
    let places = client(args)?.fetch_all_places(&query, s.limit).await?;
    Ok(places.into_iter().map(Contact::from).collect())
}

async fn send(args: &Cli, s: SendArgs) -> Result<()> {
    let message = load_message(&s)?;
    let contacts = load_contacts(args, &s).await?;
    let eligible = contacts.iter().filter(|c| c.is_eligible()).count();
    if contacts.is_empty() {
        bail!("no prospects selected");
    }

    if s.dry_run {
        for c in contacts.iter() {
            match c.dispatch_phone() {
                Some(p) => println!("{:<40} {}", c.display_name, p),
                None => println!("{:<40} (skipped: no valid phone)", c.display_name),
            }
        }
        println!(
            "{eligible} of {} contact(s) eligible, {}",
            contacts.len(),
            s.pacing().describe()
        );
        return Ok(());
    }

    let api = client(args)?;
    let orchestrator = SendingOrchestrator::new(Arc::new(api));
    let handle = orchestrator
        .start_with_pacing(contacts, message, s.pacing())
        .context("start batch")?;

    if args.json {
        return run_send_json(orchestrator, handle, &s).await;
    }
    if !s.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(orchestrator, handle, s).await;
        }
    }
    run_send_text(orchestrator, handle, &s).await
}

/// Ctrl-C asks the controller to stop the batch and quit once it has.
fn spawn_ctrl_c(cmd_tx: mpsc::UnboundedSender<UiCommand>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cmd_tx.send(UiCommand::Quit);
        }
    })
}

async fn run_send_json(
    orchestrator: SendingOrchestrator,
    mut handle: BatchHandle,
    s: &SendArgs,
) -> Result<()> {
    let report = tokio::select! {
        res = &mut handle => res.context("batch task failed")?,
        _ = tokio::signal::ctrl_c() => {
            orchestrator.cancel();
            handle.await.context("batch task failed")?
        }
    };

    let processed = orchestrator::process_run_completion(&s.report_targets(), &report);
    print_json(&report)?;
    for m in processed.messages {
        eprintln!("{m}");
    }
    Ok(())
}

async fn run_send_text(
    orchestrator: SendingOrchestrator,
    handle: BatchHandle,
    s: &SendArgs,
) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<UiEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let ctrl_c = spawn_ctrl_c(cmd_tx.clone());

    let initial = orchestrator.snapshot();
    let _ = out_tx.send(OutputLine::Stderr(format!(
        "Sending to {} contact(s), {}",
        initial.total_contacts,
        s.pacing().describe()
    )));

    let mut state_rx = orchestrator.subscribe();
    let ctrl = tokio::spawn(orchestrator::run_controller(
        orchestrator.clone(),
        handle,
        event_tx,
        cmd_rx,
    ));

    let mut prev = BatchState {
        total_contacts: initial.total_contacts,
        ..Default::default()
    };
    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let cur = state_rx.borrow_and_update().clone();
                for line in crate::text_summary::progress_lines(&prev, &cur) {
                    let _ = out_tx.send(OutputLine::Stderr(line));
                }
                prev = cur;
            }
            ev = event_rx.recv() => {
                match ev {
                    Some(UiEvent::Info(msg)) => {
                        let _ = out_tx.send(OutputLine::Stderr(msg));
                    }
                    Some(UiEvent::RunFinished(_)) | None => break,
                }
            }
        }
    }
    // The batch is over; let the controller return the report.
    let _ = cmd_tx.send(UiCommand::Quit);
    ctrl_c.abort();
    let report = ctrl
        .await
        .context("controller task failed")??
        .context("batch ended without a report")?;

    // The last result may have raced the finish event.
    let last = orchestrator.snapshot();
    for line in crate::text_summary::progress_lines(&prev, &last) {
        let _ = out_tx.send(OutputLine::Stderr(line));
    }

    let summary = crate::text_summary::build_text_summary(&report);
    for line in summary.lines {
        let _ = out_tx.send(OutputLine::Stdout(line));
    }
    let processed = orchestrator::process_run_completion(&s.report_targets(), &report);
    for m in processed.messages {
        let _ = out_tx.send(OutputLine::Stderr(m));
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacing_from_flags() {
        let cli = Cli::parse_from(["prospect-manager", "send", "--message", "oi"]);
        let Command::Send(s) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(s.pacing(), Pacing::fixed_secs(30));
        assert!(s.auto_save);

        let cli = Cli::parse_from([
            "prospect-manager",
            "send",
            "--message",
            "oi",
            "--interval-min",
            "1m",
            "--interval-max",
            "3m",
        ]);
        let Command::Send(s) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(
            s.pacing(),
            Pacing::Range {
                min: Duration::from_secs(60),
                max: Duration::from_secs(180),
            }
        );
    }

    #[test]
    fn interval_bounds_must_come_together() {
        let res = Cli::try_parse_from([
            "prospect-manager",
            "send",
            "--message",
            "oi",
            "--interval-min",
            "1m",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn send_filters_map_to_query() {
        let cli = Cli::parse_from([
            "prospect-manager",
            "send",
            "--message",
            "oi",
            "--city",
            "Campinas",
            "--has-website",
            "false",
            "--exclude-first-message-failed",
        ]);
        let Command::Send(s) = cli.command else {
            panic!("expected send");
        };
        let q = s.filters.to_query(Some(1), Some(50));
        assert_eq!(q.city.as_deref(), Some("Campinas"));
        assert_eq!(q.has_website, Some(false));
        assert_eq!(q.exclude_first_message_failed, Some(true));
        assert_eq!(q.first_message_sent, None);
    }

    #[test]
    fn terminal_ui_only_for_interactive_send() {
        let cli = Cli::parse_from(["prospect-manager", "niches"]);
        assert!(!uses_terminal_ui(&cli));
        let cli = Cli::parse_from(["prospect-manager", "send", "--message", "x", "--text"]);
        assert!(!uses_terminal_ui(&cli));
        let cli = Cli::parse_from(["prospect-manager", "--json", "send", "--message", "x"]);
        assert!(!uses_terminal_ui(&cli));
    }

    #[test]
    fn campaign_phones_formats() {
        let raw = ["+55 11 99999-0000", "+1", "+5521988887777"];
        assert_eq!(
            campaign_phones(raw.iter().copied(), PhoneFormat::E164),
            vec!["+5511999990000", "+5521988887777"]
        );
        assert_eq!(
            campaign_phones(raw.iter().copied(), PhoneFormat::Digits),
            vec!["5511999990000", "5521988887777"]
        );
    }
}
