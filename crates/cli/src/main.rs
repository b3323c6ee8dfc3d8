use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sanitation_core::{detect_intent, normalize_text, Language, LookupTables, TextSubmission};
use sanitation_desk::{ComplaintDesk, DeskSettings};
use sanitation_ml::{
    classify_image, preprocess, reference_features, ReferenceExample, VisionConfig, VisionStack,
};
use sanitation_observability::{init_tracing, AppMetrics};
use sanitation_storage::{ComplaintRepository, Store};

#[derive(Debug, Parser)]
#[command(name = "sanitation")]
#[command(about = "Sanitation complaint desk CLI")]
struct Cli {
    #[arg(long, env = "SANITATION_DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "SANITATION_TABLES_PATH")]
    tables: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Detect complaint intent and language in a message.
    Detect {
        text: String,
        #[arg(long, default_value = "en")]
        default_language: String,
    },
    /// Map an image class id to issue, bin and waste type.
    Resolve { class_id: u16 },
    /// Classify an image file with the configured model.
    Classify { image: PathBuf },
    Reference {
        #[command(subcommand)]
        command: ReferenceCommand,
    },
    /// Draft and file a complaint in one go.
    File {
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        image: Option<PathBuf>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        language: Option<String>,
    },
    /// Interactive complaint session.
    Chat,
    Show { id: String },
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Debug, Subcommand)]
enum ReferenceCommand {
    /// Append an image's pooled features to a centroid reference set.
    Add {
        image: PathBuf,
        #[arg(long)]
        class_id: u16,
        #[arg(long, default_value = "models/waste_references.jsonl")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("sanitation_cli");
    let cli = Cli::parse();

    let tables = load_tables(cli.tables.as_deref())?;

    match cli.command {
        Command::Detect {
            text,
            default_language,
        } => {
            let default_language = Language::from_code_or_default(Some(default_language.as_str()));
            let result = detect_intent(&normalize_text(&text), default_language);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Resolve { class_id } => {
            let analysis = tables.resolve(class_id);
            println!("{}", serde_json::to_string_pretty(&analysis)?);
            println!("{}", analysis.bin_type.guidance());
        }
        Command::Classify { image } => {
            let vision = VisionStack::load(&VisionConfig::from_env())?;
            let bytes = read_image(&image)?;
            let prediction = classify_image(vision.classifier.as_ref(), &bytes)?;
            let analysis = tables.resolve(prediction.class_id);
            println!("{}", serde_json::to_string_pretty(&prediction)?);
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Command::Reference { command } => match command {
            ReferenceCommand::Add {
                image,
                class_id,
                output,
            } => append_reference(&image, class_id, &output)?,
        },
        Command::File {
            text,
            image,
            location,
            language,
        } => {
            let desk = build_desk(tables, cli.database_url.as_deref()).await?;
            let mut draft_id = None;

            if let Some(text) = text {
                let outcome = desk
                    .process_text(TextSubmission {
                        text,
                        default_language: language.clone(),
                        draft_id: draft_id.clone(),
                    })
                    .await?;
                draft_id = outcome.draft_id.or(draft_id);
            }
            if let Some(image) = image {
                let outcome = desk
                    .analyze_image(read_image(&image)?, draft_id.as_deref())
                    .await?;
                println!("{}", outcome.guidance);
                draft_id = Some(outcome.draft_id);
            }
            if let Some(location) = location {
                draft_id = Some(desk.set_location(draft_id.as_deref(), &location).await?);
            }

            let filed = desk
                .file_complaint(draft_id.as_deref(), language.as_deref())
                .await?;
            println!("{}", serde_json::to_string_pretty(&filed)?);
        }
        Command::Chat => {
            let desk = build_desk(tables, cli.database_url.as_deref()).await?;
            run_chat(desk).await?;
        }
        Command::Show { id } => {
            let store = open_store(cli.database_url.as_deref()).await?;
            let complaint = store
                .load_complaint(&id)
                .await?
                .with_context(|| format!("no complaint with id {id}"))?;
            println!("{}", serde_json::to_string_pretty(&complaint)?);
        }
        Command::List { limit } => {
            let store = open_store(cli.database_url.as_deref()).await?;
            let complaints = store.recent_complaints(limit.max(1)).await?;
            println!("{}", serde_json::to_string_pretty(&complaints)?);
        }
    }

    Ok(())
}

async fn run_chat(desk: ComplaintDesk<Store>) -> Result<()> {
    let mut draft_id: Option<String> = None;

    println!("Sanitation desk chat mode. Describe the problem, or use:");
    println!("  /image <path>  /location <place>  /letter  /file [language]  exit");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }
        if message.is_empty() {
            continue;
        }

        let (command, argument) = match message.split_once(' ') {
            Some((command, argument)) => (command, argument.trim()),
            None => (message, ""),
        };

        let step = match command {
            "/image" => match read_image(Path::new(argument)) {
                Ok(bytes) => desk
                    .analyze_image(bytes, draft_id.as_deref())
                    .await
                    .map(|outcome| {
                        println!(
                            "{} ({}, {})",
                            outcome.guidance,
                            outcome.analysis.detected_issue,
                            outcome.analysis.waste_type.as_str()
                        );
                        Some(outcome.draft_id)
                    })
                    .map_err(anyhow::Error::from),
                Err(err) => Err(err),
            },
            "/location" => desk
                .set_location(draft_id.as_deref(), argument)
                .await
                .map(|id| {
                    println!("Location noted.");
                    Some(id)
                })
                .map_err(anyhow::Error::from),
            "/letter" => desk
                .application_letter(draft_id.as_deref())
                .await
                .map(|letter| {
                    println!("{}\n\nSubmit at {}", letter.application_template, letter.municipal_link);
                    draft_id.clone()
                })
                .map_err(anyhow::Error::from),
            "/file" => {
                let language = Some(argument).filter(|value| !value.is_empty());
                desk.file_complaint(draft_id.as_deref(), language)
                    .await
                    .map(|filed| {
                        println!(
                            "Filed {}: {}\nTrack it at {}",
                            filed.complaint_id, filed.complaint_text, filed.submission_link
                        );
                        None
                    })
                    .map_err(anyhow::Error::from)
            }
            _ => desk
                .process_text(TextSubmission {
                    text: message.to_string(),
                    default_language: None,
                    draft_id: draft_id.clone(),
                })
                .await
                .map(|outcome| {
                    match outcome.result.keyword.as_deref() {
                        Some(keyword) => println!(
                            "Complaint about {keyword} noted ({}). Add /location and /file when ready.",
                            outcome.result.language.as_code()
                        ),
                        None => println!("I can help file sanitation complaints. Try describing the problem."),
                    }
                    outcome.draft_id
                })
                .map_err(anyhow::Error::from),
        };

        match step {
            Ok(next) => draft_id = next,
            Err(err) => println!("error: {err:#}"),
        }
    }

    Ok(())
}

fn load_tables(path: Option<&Path>) -> Result<LookupTables> {
    match path {
        Some(path) => LookupTables::from_json_file(path)
            .with_context(|| format!("failed loading lookup tables from {}", path.display())),
        None => Ok(LookupTables::builtin().clone()),
    }
}

async fn open_store(database_url: Option<&str>) -> Result<Store> {
    match database_url {
        Some(database_url) => Store::sqlite(database_url).await,
        None => Ok(Store::memory()),
    }
}

async fn build_desk(
    tables: LookupTables,
    database_url: Option<&str>,
) -> Result<ComplaintDesk<Store>> {
    let vision =
        VisionStack::load(&VisionConfig::from_env()).context("image classifier unavailable")?;
    let store = open_store(database_url).await?;

    Ok(ComplaintDesk::new(
        Arc::new(tables),
        vision,
        Arc::new(store),
        AppMetrics::shared(),
        DeskSettings::default(),
    ))
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed reading image {}", path.display()))
}

fn append_reference(image: &Path, class_id: u16, output: &Path) -> Result<()> {
    let tensor = preprocess(&read_image(image)?)?;
    let example = ReferenceExample {
        class_id,
        features: reference_features(&tensor),
    };

    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(output)
        .with_context(|| format!("failed opening {}", output.display()))?;
    writeln!(file, "{}", serde_json::to_string(&example)?)?;

    println!("added class {class_id} reference to {}", output.display());
    Ok(())
}
