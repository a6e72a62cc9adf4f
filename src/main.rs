use anyhow::Context;
use chrono::Local;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};

use tender_ai::ai::{AiClient, GeminiProvider};
use tender_ai::app_state::{render_event, AppEvent};
use tender_ai::commands::{AppCommand, HELP_TEXT};
use tender_ai::config::{resolve_api_key, AppConfig};
use tender_ai::job::{ChatRole, ChatTurn, JobService};
use tender_ai::storage::establish_connection;

type ChatHistories = Arc<Mutex<HashMap<i32, Vec<ChatTurn>>>>;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let ts = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let log_dir = std::path::PathBuf::from("logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_file = std::fs::File::create(log_dir.join(format!("app-{}.log", ts)))?;
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter_level(log::LevelFilter::Warn)
        .filter_module("tender_ai", log::LevelFilter::Info)
        .filter_module("sqlx", log::LevelFilter::Error)
        .filter_module("sea_orm", log::LevelFilter::Error)
        .init();

    if let Err(e) = dotenv::dotenv() {
        log::info!("no .env loaded: {}", e);
    }
    let config = AppConfig::from_env();
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

    let db = Arc::new(
        establish_connection(&config.database_url)
            .await
            .with_context(|| format!("connecting to {}", config.database_url))?,
    );

    let Some((api_key, source)) = resolve_api_key(db.as_ref(), &config).await? else {
        anyhow::bail!(
            "no Gemini API key: set GEMINI_API_KEY, add gemini_api_key to {} or store the \
             tender_ai.gemini_api_key setting",
            config.config_file.display()
        );
    };
    log::info!("Gemini API key loaded from {}", source);

    let provider = GeminiProvider::new(api_key, config.gemini_base_url.clone())?;
    let ai = Arc::new(AiClient::new(Arc::new(provider), config.ai_settings()));

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<AppCommand>();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<AppEvent>();

    let service = Arc::new(JobService::new(
        Arc::clone(&db),
        ai,
        config.job_settings(),
        evt_tx.clone(),
    ));
    match service.recover().await {
        Ok(0) => {}
        Ok(n) => {
            let _ = evt_tx.send(AppEvent::Message(format!(
                "{} interrupted job(s) marked failed",
                n
            )));
        }
        Err(e) => log::error!("startup recovery failed: {}", e),
    }

    // actor: owns the service and handles commands one by one
    let evt_tx_bg = evt_tx.clone();
    let actor = tokio::spawn(async move {
        let histories: ChatHistories = Arc::new(Mutex::new(HashMap::new()));
        while let Some(cmd) = cmd_rx.recv().await {
            handle_command(&service, cmd, &evt_tx_bg, &histories).await;
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(event) = evt_rx.recv().await {
            for line in render_event(&event) {
                println!("{}", line);
            }
        }
    });

    let _ = evt_tx.send(AppEvent::Message(HELP_TEXT.to_string()));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Ok(cmd) = line.parse::<AppCommand>() else {
            continue;
        };
        match cmd {
            AppCommand::Quit => break,
            AppCommand::Unknown(msg) if msg.is_empty() => continue,
            cmd => {
                if cmd_tx.send(cmd).is_err() {
                    break;
                }
            }
        }
    }

    drop(cmd_tx);
    let _ = actor.await;
    printer.abort();
    Ok(())
}

async fn handle_command(
    service: &Arc<JobService>,
    cmd: AppCommand,
    evt_tx: &mpsc::UnboundedSender<AppEvent>,
    histories: &ChatHistories,
) {
    let result = match cmd {
        AppCommand::Submit { path } => service.submit_path(&path).await.map(|id| {
            let _ = evt_tx.send(AppEvent::Message(format!(
                "job {} created from {}",
                id,
                path.display()
            )));
        }),
        AppCommand::Extract { job_id } => service.extract(job_id).await.map(|_| ()),
        AppCommand::Evaluate { job_id } => service.evaluate(job_id).await.map(|_| ()),
        AppCommand::Cancel { job_id } => service.cancel(job_id).await,
        AppCommand::Reset { job_id } => {
            histories.lock().await.remove(&job_id);
            service.reset(job_id).await
        }
        AppCommand::Status { job_id } => service.status(job_id).await.map(|status| {
            let _ = evt_tx.send(AppEvent::Status(Box::new(status)));
        }),
        AppCommand::Jobs => service.list_jobs().await.map(|jobs| {
            let _ = evt_tx.send(AppEvent::Jobs(jobs));
        }),
        AppCommand::Chat { job_id, question } => {
            // provider calls can take a while; keep the actor responsive
            let (svc, tx, histories) = (Arc::clone(service), evt_tx.clone(), Arc::clone(histories));
            tokio::spawn(async move {
                let history = histories.lock().await.get(&job_id).cloned().unwrap_or_default();
                match svc.chat(job_id, &question, &history).await {
                    Ok(text) => {
                        let mut all = histories.lock().await;
                        let turns = all.entry(job_id).or_default();
                        turns.push(ChatTurn {
                            role: ChatRole::User,
                            text: question,
                        });
                        turns.push(ChatTurn {
                            role: ChatRole::Assistant,
                            text: text.clone(),
                        });
                        let _ = tx.send(AppEvent::Answer { job_id, text });
                    }
                    Err(e) => {
                        let _ = tx.send(AppEvent::Error(format!("chat failed: {}", e)));
                    }
                }
            });
            Ok(())
        }
        AppCommand::Export { job_id, path } => {
            let (svc, tx) = (Arc::clone(service), evt_tx.clone());
            tokio::spawn(async move {
                match svc.export(job_id, &path).await {
                    Ok(sheets) => {
                        let _ = tx.send(AppEvent::Exported {
                            job_id,
                            path,
                            sheets,
                        });
                    }
                    Err(e) => {
                        let _ = tx.send(AppEvent::Error(format!("export failed: {}", e)));
                    }
                }
            });
            Ok(())
        }
        AppCommand::Help => {
            let _ = evt_tx.send(AppEvent::Message(HELP_TEXT.to_string()));
            Ok(())
        }
        AppCommand::Quit => Ok(()),
        AppCommand::Unknown(msg) => {
            let _ = evt_tx.send(AppEvent::Error(msg));
            Ok(())
        }
    };

    if let Err(e) = result {
        let _ = evt_tx.send(AppEvent::Error(e.to_string()));
    }
}
