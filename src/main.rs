use async_trait::async_trait;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use tolgee_sync::config::DEFAULT_CONFIG_FILE;
use tolgee_sync::monitor::{load_initial_data, project_status};
use tolgee_sync::{
    AutoConfirm, ConfigError, Confirmation, ManifestGatherer, Settings, SyncOrchestrator,
    SyncOutcome, SyncSelection, SyncSummary, TolgeeClient, TranslationStore, UpdateMonitor,
    download_po_file, ensure_project_id, upload_po_file,
};

fn cli() -> Command {
    Command::new("tolgee-sync")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Synchronize localization keys and translations with a Tolgee project")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Settings file")
                .default_value(DEFAULT_CONFIG_FILE)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Log debug output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("fetch")
                .about("Download all translations and print what was fetched")
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .help("Also write the translations snapshot to this file"),
                ),
        )
        .subcommand(
            Command::new("export")
                .about("Download all translations into the snapshot file")
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .help("Snapshot file (default: snapshotPath from the settings)"),
                ),
        )
        .subcommand(Command::new("diff").about("Show which keys a sync would add, update or delete"))
        .subcommand(
            Command::new("sync")
                .about("Upload new keys, update changed ones and delete unused ones")
                .arg(
                    Arg::new("yes")
                        .long("yes")
                        .short('y')
                        .help("Do not ask for confirmation")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no-add")
                        .long("no-add")
                        .help("Skip uploading new keys")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no-update")
                        .long("no-update")
                        .help("Skip updating changed keys")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no-delete")
                        .long("no-delete")
                        .help("Skip deleting unused keys")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("status").about("Show the project and when each language last changed"))
        .subcommand(Command::new("watch").about("Keep translations up to date until interrupted"))
        .subcommand(
            Command::new("upload-po")
                .about("Import a PO file into the project")
                .arg(Arg::new("file").help("PO file to upload").required(true))
                .arg(
                    Arg::new("keep-other-keys")
                        .long("keep-other-keys")
                        .help("Keep project keys that are missing from the file")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("download-po")
                .about("Export one locale of the project as a PO file")
                .arg(Arg::new("locale").help("Locale to export").required(true))
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .help("Destination file (default: <locale>.po)"),
                ),
        )
}

/// Asks on the terminal, one question per non-empty category
struct StdinConfirm {
    allowed: SyncSelection,
}

fn ask(question: &str) -> bool {
    print!("{} [y/N] ", question);
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match std::io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

#[async_trait]
impl Confirmation for StdinConfirm {
    async fn confirm(&self, summary: &SyncSummary) -> SyncSelection {
        let summary = *summary;
        let allowed = self.allowed;
        tokio::task::spawn_blocking(move || {
            println!("Pending operations:");
            println!("  upload {} new keys", summary.to_add);
            println!("  update {} outdated keys", summary.to_update);
            println!("  delete {} unused keys", summary.to_delete);

            SyncSelection {
                add: allowed.add && summary.to_add > 0 && ask("Upload new keys?"),
                update: allowed.update && summary.to_update > 0 && ask("Update outdated keys?"),
                delete: allowed.delete && summary.to_delete > 0 && ask("Delete unused keys?"),
            }
        })
        .await
        .unwrap_or_default()
    }
}

fn load_settings(matches: &ArgMatches) -> Result<Settings, ConfigError> {
    let path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let settings = Settings::load(&path)?;
    settings.validate().map_err(ConfigError::ValidationErrors)?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = cli().get_matches();

    let level = if matches.get_flag("verbose") { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    let mut settings = load_settings(&matches)?;
    let client = Arc::new(TolgeeClient::from_settings(&settings)?);
    let store = Arc::new(TranslationStore::new(client.clone(), settings.languages.clone()));

    match matches.subcommand() {
        Some(("fetch", sub)) => {
            let snapshot = store.refresh_and_wait(settings.fetch_timeout()).await?;
            println!(
                "Fetched {} keys, {} translations in {} locales",
                snapshot.keys.len(),
                snapshot.dictionary.len(),
                snapshot.dictionary.locales().len()
            );
            if let Some(output) = sub.get_one::<String>("output") {
                snapshot.dictionary.save_to_file(&PathBuf::from(output))?;
                println!("Snapshot written to {}", output);
            }
        }
        Some(("export", sub)) => {
            let path = sub
                .get_one::<String>("output")
                .map(PathBuf::from)
                .unwrap_or_else(|| settings.snapshot_path.clone());
            store.refresh_and_wait(settings.fetch_timeout()).await?;
            store.export(&path, settings.fetch_timeout()).await?;
            println!("Snapshot written to {}", path.display());
        }
        Some(("diff", _)) => {
            let orchestrator = orchestrator(&store, &settings);
            let reconciliation = orchestrator.diff().await?;
            if reconciliation.is_empty() {
                println!("Everything is up to date.");
            }
            for key in &reconciliation.to_add {
                println!("+ {}:{} \"{}\"", key.namespace, key.name, key.default_text);
            }
            for (key, remote) in &reconciliation.to_update {
                println!(
                    "~ {}:{} (id {}) \"{}\"",
                    key.namespace,
                    key.name,
                    remote.remote_id.map_or_else(|| "?".to_string(), |id| id.to_string()),
                    key.default_text
                );
            }
            for key in &reconciliation.to_delete {
                println!(
                    "- {}:{} (id {})",
                    key.namespace,
                    key.name,
                    key.remote_id.map_or_else(|| "?".to_string(), |id| id.to_string())
                );
            }
        }
        Some(("sync", sub)) => {
            let allowed = SyncSelection {
                add: !sub.get_flag("no-add"),
                update: !sub.get_flag("no-update"),
                delete: !sub.get_flag("no-delete"),
            };
            let confirmation: Box<dyn Confirmation> = if sub.get_flag("yes") {
                Box::new(AutoConfirm(allowed))
            } else {
                Box::new(StdinConfirm { allowed })
            };

            let report = orchestrator(&store, &settings)
                .sync(confirmation.as_ref())
                .await?;
            match report.outcome {
                SyncOutcome::UpToDate => println!("Everything is up to date."),
                SyncOutcome::NothingSelected => println!("Nothing selected, no changes made."),
                SyncOutcome::Executed(execution) => {
                    println!(
                        "Uploaded {}, updated {}, deleted {} keys ({} skipped without id)",
                        execution.uploaded,
                        execution.updated,
                        execution.deleted,
                        execution.skipped.len()
                    );
                    for (operation, error) in &execution.failures {
                        eprintln!("Failed to {}: {}", operation, error);
                    }
                    if !execution.is_success() {
                        return Err("some operations failed".into());
                    }
                }
            }
        }
        Some(("status", _)) => {
            let status = project_status(&store).await?;
            println!("Project: {}", status.project_id);
            if let Some(configured) = settings.project_id.filter(|id| *id != status.project_id) {
                println!("Warning: settings name project {} but the API key belongs to {}", configured, status.project_id);
            }
            for (language, updated_at) in &status.languages {
                match updated_at {
                    Some(at) => println!("  {}: updated at {}", language, at),
                    None => println!("  {}: no translations", language),
                }
            }
        }
        Some(("watch", _)) => {
            if !settings.live_translation_updates {
                load_initial_data(&store, &settings).await?;
                println!("Live updates are disabled; loaded {}", settings.snapshot_path.display());
                return Ok(());
            }

            let monitor = UpdateMonitor::new(store.clone());
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let mut updates = store.subscribe();

            info!("Watching for translation updates every {:?}", settings.update_interval());
            tokio::select! {
                _ = monitor.run(settings.update_interval(), shutdown_rx) => {}
                _ = async {
                    while updates.changed().await.is_ok() {
                        let snapshot = updates.borrow_and_update().clone();
                        println!("Revision {}: {} translations", snapshot.revision, snapshot.dictionary.len());
                    }
                } => {}
                _ = tokio::signal::ctrl_c() => {
                    shutdown_tx.send_replace(true);
                    info!("Stopped watching");
                }
            }
        }
        Some(("upload-po", sub)) => {
            let path = sub
                .get_one::<String>("file")
                .map(PathBuf::from)
                .ok_or("missing PO file")?;
            let project_id = ensure_project_id(&*client, &mut settings).await?;
            let response =
                upload_po_file(&*client, project_id, &path, !sub.get_flag("keep-other-keys")).await?;
            println!("Uploaded {} to project {}", path.display(), project_id);
            println!("{}", response);
        }
        Some(("download-po", sub)) => {
            let locale = sub.get_one::<String>("locale").ok_or("missing locale")?;
            let path = sub
                .get_one::<String>("output")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(format!("{}.po", locale)));
            let project_id = ensure_project_id(&*client, &mut settings).await?;
            let written = download_po_file(&*client, project_id, locale, &path).await?;
            println!("Wrote {} bytes of {} to {}", written, locale, path.display());
        }
        _ => unreachable!("subcommand_required"),
    }

    Ok(())
}

fn orchestrator(store: &Arc<TranslationStore>, settings: &Settings) -> SyncOrchestrator {
    SyncOrchestrator::new(
        store.clone(),
        Arc::new(ManifestGatherer::from_settings(settings)),
        settings.clone(),
    )
}
