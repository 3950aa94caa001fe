//! kura command line client.
//!
//! Reads named disks from a TOML config and runs one storage operation.
//!
//! Usage:
//!   kura --config kura.toml put docs/readme.md README.md
//!   kura ls docs
//!   kura --disk cdn url img/logo.png
//!   RUST_LOG=kura_store=debug kura mv docs archive/docs

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::{EnvFilter, fmt};

use kura_store::{Backend, KuraConfig, Storage, open};

/// File storage over sql, s3 and static disks.
#[derive(Parser, Debug)]
#[command(name = "kura")]
#[command(about = "File storage over sql, s3 and static disks")]
struct Cli {
    /// Config file with [disks.*] tables
    #[arg(short, long, default_value = "kura.toml")]
    config: PathBuf,

    /// Disk to use (defaults to the config's default disk)
    #[arg(short, long)]
    disk: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Store a file, reading SOURCE or stdin
    Put { path: String, source: Option<PathBuf> },
    /// Print a file to stdout
    Cat { path: String },
    /// Print whether a path exists
    Exists { path: String },
    /// Print entry attributes as JSON
    Stat { path: String },
    /// Create a directory
    Mkdir { path: String },
    /// List the direct children of a directory
    Ls {
        #[arg(default_value = "/")]
        parent: String,
        /// Only directories
        #[arg(long, conflicts_with = "files")]
        dirs: bool,
        /// Only files
        #[arg(long)]
        files: bool,
    },
    /// Move a file or directory
    Mv { from: String, to: String },
    /// Copy a file
    Cp { from: String, to: String },
    /// Delete files
    Rm {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Delete a directory and everything beneath it
    Rmdir { path: String },
    /// Print the public URL of a path
    Url { path: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean for cat/stat
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    let config = KuraConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let disk = config
        .disk(cli.disk.as_deref())?
        .clone()
        .into_disk()
        .context("preparing disk")?;
    let storage = open(disk).context("opening disk")?;

    run(&storage, cli.command).await
}

async fn run(storage: &Backend, command: Command) -> Result<()> {
    let mut stdout = tokio::io::stdout();

    match command {
        Command::Put { path, source } => {
            let content = match source {
                Some(source) => tokio::fs::read(&source)
                    .await
                    .with_context(|| format!("reading {}", source.display()))?,
                None => {
                    let mut buf = Vec::new();
                    tokio::io::stdin().read_to_end(&mut buf).await?;
                    buf
                }
            };
            storage
                .put(&path, &content)
                .await
                .with_context(|| format!("put {path}"))?;
            tracing::info!(%path, size = content.len(), "stored");
        }
        Command::Cat { path } => {
            let content = storage
                .read_file(&path)
                .await
                .with_context(|| format!("cat {path}"))?;
            stdout.write_all(&content).await?;
        }
        Command::Exists { path } => {
            let found = storage.exists(&path).await?;
            stdout.write_all(format!("{found}\n").as_bytes()).await?;
        }
        Command::Stat { path } => {
            let attr = storage
                .stat(&path)
                .await
                .with_context(|| format!("stat {path}"))?;
            let json = serde_json::to_string_pretty(&attr)?;
            stdout.write_all(format!("{json}\n").as_bytes()).await?;
        }
        Command::Mkdir { path } => {
            storage.make_directory(&path).await?;
        }
        Command::Ls { parent, dirs, files } => {
            let mut out = String::new();
            if !files {
                for name in storage.directories(&parent).await? {
                    out.push_str(&name);
                    out.push_str("/\n");
                }
            }
            if !dirs {
                for name in storage.files(&parent).await? {
                    out.push_str(&name);
                    out.push('\n');
                }
            }
            stdout.write_all(out.as_bytes()).await?;
        }
        Command::Mv { from, to } => {
            storage
                .rename(&from, &to)
                .await
                .with_context(|| format!("mv {from} {to}"))?;
        }
        Command::Cp { from, to } => {
            storage
                .copy(&from, &to)
                .await
                .with_context(|| format!("cp {from} {to}"))?;
        }
        Command::Rm { paths } => {
            let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
            storage.delete_file(&paths).await?;
        }
        Command::Rmdir { path } => {
            storage.delete_directory(&path).await?;
        }
        Command::Url { path } => {
            let url = storage.url(&path)?;
            stdout.write_all(format!("{url}\n").as_bytes()).await?;
        }
    }

    stdout.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn memory_disk() -> Backend {
        let config = KuraConfig::from_toml_str(
            "[disks.mem]\ndriver = \"sql\"\nurl = \"https://mem.example.com\"\ndatabase = \":memory:\"\nautomigrate = true\n",
        )
        .unwrap();
        open(config.disk(None).unwrap().clone().into_disk().unwrap()).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_put() {
        let cli = Cli::try_parse_from(["kura", "--disk", "cdn", "put", "a.txt", "local.txt"]).unwrap();
        assert_eq!(cli.disk.as_deref(), Some("cdn"));
        assert_eq!(cli.config, PathBuf::from("kura.toml"));
        assert_eq!(
            cli.command,
            Command::Put {
                path: "a.txt".into(),
                source: Some(PathBuf::from("local.txt")),
            }
        );
    }

    #[test]
    fn test_parse_ls_defaults_to_root() {
        let cli = Cli::try_parse_from(["kura", "ls"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Ls {
                parent: "/".into(),
                dirs: false,
                files: false,
            }
        );
        assert!(Cli::try_parse_from(["kura", "ls", "--dirs", "--files"]).is_err());
    }

    #[test]
    fn test_parse_rm_requires_paths() {
        assert!(Cli::try_parse_from(["kura", "rm"]).is_err());
        let cli = Cli::try_parse_from(["kura", "rm", "a", "b"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Rm {
                paths: vec!["a".into(), "b".into()],
            }
        );
    }

    #[tokio::test]
    async fn test_run_commands() {
        let storage = memory_disk();

        run(&storage, Command::Mkdir { path: "docs".into() }).await.unwrap();
        storage.put("docs/a.txt", b"a").await.unwrap();
        run(
            &storage,
            Command::Cp {
                from: "docs/a.txt".into(),
                to: "docs/b.txt".into(),
            },
        )
        .await
        .unwrap();
        run(
            &storage,
            Command::Mv {
                from: "docs".into(),
                to: "archive".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(storage.files("archive").await.unwrap(), vec!["a.txt", "b.txt"]);

        run(
            &storage,
            Command::Rm {
                paths: vec!["archive/a.txt".into()],
            },
        )
        .await
        .unwrap();
        assert_eq!(storage.files("archive").await.unwrap(), vec!["b.txt"]);

        run(&storage, Command::Rmdir { path: "archive".into() }).await.unwrap();
        assert!(!storage.exists("archive").await.unwrap());
    }

    #[tokio::test]
    async fn test_run_reports_failures() {
        let storage = memory_disk();
        let err = run(&storage, Command::Cat { path: "missing.txt".into() })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing.txt"));
    }
}
