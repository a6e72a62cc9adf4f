use std::path::PathBuf;
use std::str::FromStr;

pub const HELP_TEXT: &str = "commands: submit <zip> | extract <id> | evaluate <id> | cancel <id> | \
reset <id> | status <id> | jobs | chat <id> <question> | export <id> <file.xlsx> | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    Submit { path: PathBuf },
    Extract { job_id: i32 },
    Evaluate { job_id: i32 },
    Cancel { job_id: i32 },
    Reset { job_id: i32 },
    Status { job_id: i32 },
    Jobs,
    Chat { job_id: i32, question: String },
    Export { job_id: i32, path: PathBuf },
    Help,
    Quit,
    Unknown(String),
}

fn job_id(parts: &[&str], usage: &str) -> Result<i32, AppCommand> {
    parts
        .get(1)
        .and_then(|s| s.parse::<i32>().ok())
        .ok_or_else(|| AppCommand::Unknown(format!("usage: {}", usage)))
}

impl FromStr for AppCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(AppCommand::Unknown("".to_string()));
        }

        let cmd = match parts[0].to_ascii_lowercase().as_str() {
            "submit" => {
                let path = parts[1..].join(" ");
                if path.is_empty() {
                    AppCommand::Unknown("usage: submit <zip>".to_string())
                } else {
                    AppCommand::Submit {
                        path: PathBuf::from(path),
                    }
                }
            }
            "extract" => job_id(&parts, "extract <id>")
                .map(|job_id| AppCommand::Extract { job_id })
                .unwrap_or_else(|e| e),
            "evaluate" | "eval" => job_id(&parts, "evaluate <id>")
                .map(|job_id| AppCommand::Evaluate { job_id })
                .unwrap_or_else(|e| e),
            "cancel" => job_id(&parts, "cancel <id>")
                .map(|job_id| AppCommand::Cancel { job_id })
                .unwrap_or_else(|e| e),
            "reset" => job_id(&parts, "reset <id>")
                .map(|job_id| AppCommand::Reset { job_id })
                .unwrap_or_else(|e| e),
            "status" => job_id(&parts, "status <id>")
                .map(|job_id| AppCommand::Status { job_id })
                .unwrap_or_else(|e| e),
            "jobs" | "ls" => AppCommand::Jobs,
            "chat" => match job_id(&parts, "chat <id> <question>") {
                Ok(job_id) if parts.len() > 2 => AppCommand::Chat {
                    job_id,
                    question: parts[2..].join(" "),
                },
                Ok(_) => AppCommand::Unknown("usage: chat <id> <question>".to_string()),
                Err(e) => e,
            },
            "export" => match job_id(&parts, "export <id> <file.xlsx>") {
                Ok(job_id) if parts.len() > 2 => AppCommand::Export {
                    job_id,
                    path: PathBuf::from(parts[2..].join(" ")),
                },
                Ok(_) => AppCommand::Unknown("usage: export <id> <file.xlsx>".to_string()),
                Err(e) => e,
            },
            "help" | "h" => AppCommand::Help,
            "quit" | "q" | "exit" => AppCommand::Quit,
            other => AppCommand::Unknown(format!("unknown command: {}", other)),
        };
        Ok(cmd)
    }
}
