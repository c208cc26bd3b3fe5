use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_shared::GenerateSampleCodesReq;
use biobank_client::BackendClient;
use biobank_core::collaborators::{Credentials, SignaturePurpose};
use biobank_core::config::{box_capacity_from_env_value, flag_from_env_value};
use biobank_core::constants::DEFAULT_DATA_DIR;
use biobank_core::edit::{CodeEditSession, SignatureGate};
use biobank_core::stability::{generate_stability_qc, SampleCategory, StabilityQcRequest};
use biobank_core::{
    CancellationToken, CodeGenerator, CodeIdGenerator, CodeRule, CoreConfig, GenerationRequest,
    NonEmptyText, ProjectCodes, ProjectId, ProjectService,
};

mod reconcile;

#[derive(Parser)]
#[command(name = "biobank")]
#[command(about = "Biobank sample code generation and reconciliation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Clone)]
struct BackendArgs {
    /// Backend base URL
    #[arg(long, env = "BIOBANK_BACKEND_URL")]
    backend: String,
    /// API key sent as x-api-key
    #[arg(long, env = "BIOBANK_API_KEY")]
    api_key: Option<String>,
}

impl BackendArgs {
    fn client(&self) -> anyhow::Result<BackendClient> {
        backend_client(&self.backend, self.api_key.as_deref())
    }
}

fn backend_client(url: &str, api_key: Option<&str>) -> anyhow::Result<BackendClient> {
    let client = BackendClient::new(url)?;
    Ok(match api_key {
        Some(key) => client.with_api_key(key),
        None => client,
    })
}

#[derive(Subcommand)]
enum Commands {
    /// List all projects in the local data directory
    List,
    /// Create a project in the local data directory
    CreateProject {
        /// Project name
        name: String,
        /// Sponsor project code
        #[arg(long)]
        sponsor: String,
        /// Lab project code (optional)
        #[arg(long)]
        lab: Option<String>,
    },
    /// Save a sample code rule from a YAML file
    SaveRule {
        /// Project id
        project: String,
        /// Rule file (YAML)
        rule: PathBuf,
        /// Audit reason recorded with the change
        #[arg(long)]
        reason: String,
        /// Backend base URL; the local data directory is used when absent
        #[arg(long)]
        backend: Option<String>,
        /// API key sent as x-api-key
        #[arg(long, env = "BIOBANK_API_KEY")]
        api_key: Option<String>,
        /// Signature password, required for remote saves
        #[arg(long, env = "BIOBANK_SIGNATURE_PASSWORD")]
        password: Option<String>,
    },
    /// Generate sample codes from a JSON selection
    ///
    /// Uses a stored project (`--project`, locally or through `--backend`) or previews a rule
    /// file directly (`--rule` with `--sponsor`).
    Generate {
        /// Selection file (JSON)
        #[arg(long)]
        request: PathBuf,
        /// Project id
        #[arg(long, conflicts_with = "rule", required_unless_present = "rule")]
        project: Option<String>,
        /// Rule file (YAML) for a preview without a stored project
        #[arg(long, requires = "sponsor")]
        rule: Option<PathBuf>,
        /// Sponsor project code for a rule preview
        #[arg(long)]
        sponsor: Option<String>,
        /// Lab project code for a rule preview
        #[arg(long)]
        lab: Option<String>,
        /// Backend base URL; the local data directory is used when absent
        #[arg(long, requires = "project")]
        backend: Option<String>,
        /// API key sent as x-api-key
        #[arg(long, env = "BIOBANK_API_KEY")]
        api_key: Option<String>,
    },
    /// Generate stability, QC or validation codes
    StabilityQc {
        /// Category: STB, QC or VAL
        #[arg(long)]
        category: SampleCategory,
        /// Code placed between category and number
        #[arg(long)]
        code: String,
        /// Number of codes
        #[arg(long)]
        quantity: u32,
        /// First sequence number
        #[arg(long, default_value_t = 1)]
        start: u32,
    },
    /// Change the code of a stored sample after a signature check
    EditCode {
        /// Sample id in the backend
        sample_id: String,
        /// Code currently stored
        current: String,
        /// Replacement code
        new: String,
        /// Audit reason recorded with the change
        #[arg(long)]
        reason: String,
        /// Signature password
        #[arg(long, env = "BIOBANK_SIGNATURE_PASSWORD")]
        password: String,
        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Scan a receive record from standard input, then assign storage
    Reconcile {
        /// Receive record id
        receive_record: String,
        /// Capacity of new boxes (default from BIOBANK_DEFAULT_BOX_CAPACITY)
        #[arg(long)]
        capacity: Option<u32>,
        #[command(flatten)]
        backend: BackendArgs,
    },
}

fn core_config() -> anyhow::Result<Arc<CoreConfig>> {
    let data_dir = std::env::var("BIOBANK_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into());
    let capacity = box_capacity_from_env_value(std::env::var("BIOBANK_DEFAULT_BOX_CAPACITY").ok())?;
    let allow_switch = flag_from_env_value(std::env::var("BIOBANK_ALLOW_EMPTY_BOX_SWITCH").ok())?;
    Ok(Arc::new(
        CoreConfig::new(PathBuf::from(data_dir), capacity)?.with_switch_from_empty_box(allow_switch),
    ))
}

fn read_rule(path: &Path) -> anyhow::Result<CodeRule> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading rule file {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing rule file {}", path.display()))
}

fn read_request(path: &Path) -> anyhow::Result<GenerationRequest> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading selection file {}", path.display()))?;
    let req: GenerateSampleCodesReq = serde_json::from_str(&text)
        .with_context(|| format!("parsing selection file {}", path.display()))?;
    Ok(req.into())
}

fn generate_local(
    rule: &CodeRule,
    codes: &ProjectCodes,
    request: &GenerationRequest,
) -> anyhow::Result<Vec<String>> {
    Ok(CodeGenerator::new(rule, codes)
        .generate(request, &mut CodeIdGenerator::new())?
        .iter()
        .map(|c| c.current_code().to_string())
        .collect())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cancel = CancellationToken::new();

    match cli.command {
        Some(Commands::List) => {
            let service = ProjectService::new(core_config()?);
            let projects = service.list();
            if projects.is_empty() {
                println!("No projects found.");
            } else {
                for project in projects {
                    println!(
                        "ID: {}, Name: {}, Sponsor: {}, Created: {}",
                        project.id,
                        project.name,
                        project.codes.sponsor_project_code.as_deref().unwrap_or("-"),
                        project.created_at
                    );
                }
            }
        }
        Some(Commands::CreateProject { name, sponsor, lab }) => {
            let cfg = core_config()?;
            std::fs::create_dir_all(cfg.projects_dir())?;
            let project = ProjectService::new(cfg).create(&name, ProjectCodes::new(sponsor, lab))?;
            println!("Created project with ID: {}", project.id);
        }
        Some(Commands::SaveRule {
            project,
            rule,
            reason,
            backend,
            api_key,
            password,
        }) => {
            let id = ProjectId::parse(&project)?;
            let rule = read_rule(&rule)?;
            match backend {
                Some(url) => {
                    let client = backend_client(&url, api_key.as_deref())?;
                    let password = password.context("a signature password is required")?;
                    let credentials = Credentials::new(password, SignaturePurpose::SaveCodeRule);
                    SignatureGate::authorise(&client, &credentials, &cancel).await?;
                    client
                        .save_code_rule(&id, &rule, &NonEmptyText::new(&reason)?)
                        .await?;
                }
                None => ProjectService::new(core_config()?).save_rule(&id, &rule, &reason)?,
            }
            println!("Saved sample code rule for project: {}", id);
        }
        Some(Commands::Generate {
            request,
            project,
            rule,
            sponsor,
            lab,
            backend,
            api_key,
        }) => {
            let request = read_request(&request)?;
            let codes = match (project, backend) {
                (Some(project), Some(url)) => {
                    backend_client(&url, api_key.as_deref())?
                        .generate_sample_codes(&ProjectId::parse(&project)?, &request)
                        .await?
                }
                (Some(project), None) => {
                    let id = ProjectId::parse(&project)?;
                    let service = ProjectService::new(core_config()?);
                    let project = service.load(&id)?;
                    let rule = service.load_rule(&id)?;
                    generate_local(&rule, &project.codes, &request)?
                }
                (None, _) => {
                    let rule = read_rule(&rule.context("--rule or --project is required")?)?;
                    let sponsor = sponsor.context("--sponsor is required with --rule")?;
                    generate_local(&rule, &ProjectCodes::new(sponsor, lab), &request)?
                }
            };
            for code in codes {
                println!("{}", code);
            }
        }
        Some(Commands::StabilityQc {
            category,
            code,
            quantity,
            start,
        }) => {
            let codes = generate_stability_qc(&StabilityQcRequest {
                sample_category: category,
                code,
                quantity,
                start_number: start,
            })?;
            for code in codes {
                println!("{}", code);
            }
        }
        Some(Commands::EditCode {
            sample_id,
            current,
            new,
            reason,
            password,
            backend,
        }) => {
            let client = backend.client()?;
            let pending = CodeEditSession::new(current).stage(&new)?;
            let credentials = Credentials::new(password, SignaturePurpose::EditSampleCode);
            match pending
                .commit_persisted(&client, &client, &credentials, &sample_id, &reason, &cancel)
                .await
            {
                Ok(edit) => println!("Updated {}: {} -> {}", sample_id, edit.previous, edit.code),
                Err(failure) => return Err(failure.error.into()),
            }
        }
        Some(Commands::Reconcile {
            receive_record,
            capacity,
            backend,
        }) => {
            let mut policy = core_config()?.scan_policy();
            if let Some(capacity) = capacity {
                policy.default_box_capacity = capacity;
            }
            let client = backend.client()?;
            let stdin = std::io::stdin();
            reconcile::run(&client, &receive_record, policy, stdin.lock(), &cancel).await?;
        }
        None => {
            println!("No command provided. Use --help for usage information.");
        }
    }

    Ok(())
}
