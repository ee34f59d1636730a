use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use chrono::NaiveDate;
use dcr_core::export::canonical_markup;
use dcr_core::{
    Actor, CoreConfig, ExportPipeline, LifecycleManager, LifecycleState, MarkupRenderer,
    Pagination, RecordStore, Role, SearchCriteria, SearchEngine, SectionId, SectionPayload,
};
use dcr_types::{CanonicalId, NonEmptyText};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DATA_DIR_ENV: &str = "DCR_DATA_DIR";
const DEFAULT_DATA_DIR: &str = "./dcr_data";

#[derive(Parser)]
#[command(name = "dcr")]
#[command(about = "Dental clinical record system CLI")]
struct Cli {
    /// Data directory (overrides DCR_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ActorArgs {
    /// Acting clinician's identifier (32 lowercase hex chars); generated if omitted
    #[arg(long)]
    actor_id: Option<String>,
    /// Acting clinician's name
    #[arg(long, default_value = "CLI User")]
    actor_name: String,
    /// Acting clinician's email
    #[arg(long, default_value = "cli@dcr.local")]
    actor_email: String,
    /// Role: clinician, reviewer or admin
    #[arg(long, default_value = "clinician")]
    actor_role: String,
}

impl ActorArgs {
    fn resolve(&self) -> anyhow::Result<Actor> {
        let id = match &self.actor_id {
            Some(raw) => CanonicalId::parse(raw).context("invalid --actor-id")?,
            None => CanonicalId::generate(),
        };
        let role: Role = self.actor_role.parse().map_err(anyhow::Error::msg)?;
        Ok(Actor::new(
            id,
            NonEmptyText::new(&self.actor_name).context("invalid --actor-name")?,
            NonEmptyText::new(&self.actor_email).context("invalid --actor-email")?,
            role,
        ))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new draft record for a patient
    Create {
        /// Patient identifier; generated if omitted
        patient_id: Option<String>,
        /// Initial section payloads as <section-id>=<json>, repeatable
        #[arg(long = "section")]
        sections: Vec<String>,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Merge a JSON payload into one section of a record
    EditSection {
        /// Record identifier
        record_id: String,
        /// Section identifier, e.g. chief-complaint
        section: String,
        /// Section payload as JSON
        json: String,
        /// Version the caller last read; the edit fails if the record moved on
        #[arg(long)]
        expected_version: Option<u64>,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Advance a record to the next lifecycle state
    Transition {
        /// Record identifier
        record_id: String,
        /// Target state: complete or reviewed
        target: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Return a complete or reviewed record to draft (admin only)
    Reopen {
        /// Record identifier
        record_id: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Print a record as canonical markup
    Show {
        /// Record identifier
        record_id: String,
    },
    /// List records for a patient, newest first
    List {
        /// Patient identifier
        patient_id: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        page_size: u32,
    },
    /// Search records by patient name or identification number
    Search {
        /// Substring matched against names and identification number
        #[arg(long)]
        text: Option<String>,
        /// Only records created on or after this date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Only records created on or before this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Lifecycle state filter: draft, complete or reviewed
        #[arg(long)]
        state: Option<String>,
        /// Only records authored by this clinician
        #[arg(long)]
        clinician: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        page_size: u32,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Export a record as a content-addressed artifact
    Export {
        /// Record identifier
        record_id: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Print a record's audit trail, newest first
    Audit {
        /// Record identifier
        record_id: String,
    },
    /// List a record's export artifacts, newest first
    Artifacts {
        /// Record identifier
        record_id: String,
    },
    /// Re-hash a stored export and check it against its recorded hash
    Verify {
        /// Record identifier
        record_id: String,
        /// Export sequence number
        sequence: u32,
    },
}

fn parse_section_arg(raw: &str) -> anyhow::Result<SectionPayload> {
    let (section, json) = raw
        .split_once('=')
        .context("expected --section <section-id>=<json>")?;
    parse_payload(section, json)
}

fn parse_payload(section: &str, json: &str) -> anyhow::Result<SectionPayload> {
    let section: SectionId = section.parse().map_err(anyhow::Error::msg)?;
    let value: serde_json::Value =
        serde_json::from_str(json).context("payload is not valid JSON")?;
    Ok(SectionPayload::parse(section, value)?)
}

fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("invalid date '{raw}'"))
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("dcr=warn".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let data_dir = cli
        .data_dir
        .or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let config = CoreConfig::new(data_dir)?;
    let store = RecordStore::new(Arc::new(config));

    match cli.command {
        Commands::Create {
            patient_id,
            sections,
            actor,
        } => {
            let actor = actor.resolve()?;
            let patient_id = match patient_id {
                Some(raw) => CanonicalId::parse(&raw).context("invalid patient id")?,
                None => CanonicalId::generate(),
            };
            let payloads = sections
                .iter()
                .map(|raw| parse_section_arg(raw))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let record = store.create(patient_id, &actor, payloads)?;
            println!(
                "Created record {} for patient {} (version {})",
                record.meta.id, record.meta.patient_id, record.meta.version
            );
        }
        Commands::EditSection {
            record_id,
            section,
            json,
            expected_version,
            actor,
        } => {
            let actor = actor.resolve()?;
            let record_id = CanonicalId::parse(&record_id).context("invalid record id")?;
            let payload = parse_payload(&section, &json)?;

            let record = store.update_section(&record_id, payload, &actor, expected_version)?;
            println!(
                "Updated {} of record {} (now version {})",
                section, record.meta.id, record.meta.version
            );
        }
        Commands::Transition {
            record_id,
            target,
            actor,
        } => {
            let actor = actor.resolve()?;
            let record_id = CanonicalId::parse(&record_id).context("invalid record id")?;
            let target: LifecycleState = target.parse().map_err(anyhow::Error::msg)?;

            let lifecycle = LifecycleManager::new(store);
            let record = lifecycle.transition(&record_id, target, &actor)?;
            println!(
                "Record {} is now {} (version {})",
                record.meta.id, record.meta.state, record.meta.version
            );
        }
        Commands::Reopen { record_id, actor } => {
            let actor = actor.resolve()?;
            let record_id = CanonicalId::parse(&record_id).context("invalid record id")?;

            let lifecycle = LifecycleManager::new(store);
            let record = lifecycle.reopen(&record_id, &actor)?;
            println!(
                "Record {} reopened as draft (version {})",
                record.meta.id, record.meta.version
            );
        }
        Commands::Show { record_id } => {
            let record_id = CanonicalId::parse(&record_id).context("invalid record id")?;
            let record = store.get(&record_id)?;
            print!("{}", canonical_markup(&record)?);
        }
        Commands::List {
            patient_id,
            page,
            page_size,
        } => {
            let patient_id = CanonicalId::parse(&patient_id).context("invalid patient id")?;
            let result = store.find_by_patient(&patient_id, Pagination::new(page, page_size))?;
            if result.items.is_empty() {
                println!("No records found.");
            } else {
                println!(
                    "Page {} of {} record(s):",
                    result.page, result.total_count
                );
                for record in &result.items {
                    println!(
                        "  {}  {}  version {}  created {}",
                        record.meta.id,
                        record.meta.state,
                        record.meta.version,
                        record.meta.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
        Commands::Search {
            text,
            from,
            to,
            state,
            clinician,
            page,
            page_size,
            actor,
        } => {
            let actor = actor.resolve()?;
            let criteria = SearchCriteria {
                text,
                created_from: from.as_deref().map(parse_date).transpose()?,
                created_to: to.as_deref().map(parse_date).transpose()?,
                state: state
                    .as_deref()
                    .map(str::parse)
                    .transpose()
                    .map_err(anyhow::Error::msg)?,
                clinician: clinician
                    .as_deref()
                    .map(CanonicalId::parse)
                    .transpose()
                    .context("invalid --clinician")?,
            };

            let engine = SearchEngine::new(store);
            let result = engine.search(&criteria, Pagination::new(page, page_size), &actor)?;
            if result.items.is_empty() {
                println!("No matching records.");
            } else {
                println!("{} match(es):", result.total_count);
                for record in &result.items {
                    let ident = &record.sections.identification;
                    println!(
                        "  {}  {} {}  {}  created {}",
                        record.meta.id,
                        ident.first_name.as_deref().unwrap_or("-"),
                        ident.paternal_surname.as_deref().unwrap_or("-"),
                        record.meta.state,
                        record.meta.created_at.format("%Y-%m-%d")
                    );
                }
            }
        }
        Commands::Export { record_id, actor } => {
            let actor = actor.resolve()?;
            let record_id = CanonicalId::parse(&record_id).context("invalid record id")?;

            let pipeline = ExportPipeline::new(store)?;
            let outcome = pipeline.export(&record_id, &actor, &MarkupRenderer)?;
            println!(
                "Exported record {} as artifact #{} ({}{})",
                record_id,
                outcome.metadata.sequence,
                outcome.metadata.content_hash,
                if outcome.reused { ", blob reused" } else { "" }
            );
        }
        Commands::Audit { record_id } => {
            let record_id = CanonicalId::parse(&record_id).context("invalid record id")?;
            let trail = store.audit().list(&record_id)?;
            if trail.is_empty() {
                println!("No audit entries.");
            } else {
                for entry in trail {
                    let section = entry
                        .section
                        .map(|s| format!(" [{s}]"))
                        .unwrap_or_default();
                    println!(
                        "{}  {}{}  by {} ({})",
                        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        entry.action,
                        section,
                        entry.actor_id,
                        entry.actor_role
                    );
                }
            }
        }
        Commands::Artifacts { record_id } => {
            let record_id = CanonicalId::parse(&record_id).context("invalid record id")?;
            let pipeline = ExportPipeline::new(store)?;
            let history = pipeline.artifact_history(&record_id)?;
            if history.is_empty() {
                println!("No export artifacts.");
            } else {
                for meta in history {
                    println!(
                        "#{}  {}  {} bytes  {}",
                        meta.sequence,
                        meta.content_hash,
                        meta.byte_size,
                        meta.created_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
            }
        }
        Commands::Verify {
            record_id,
            sequence,
        } => {
            let record_id = CanonicalId::parse(&record_id).context("invalid record id")?;
            let pipeline = ExportPipeline::new(store)?;
            if pipeline.verify_artifact(&record_id, sequence)? {
                println!("Artifact #{sequence} of record {record_id} is intact.");
            } else {
                println!("Artifact #{sequence} of record {record_id} FAILED verification.");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
