use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
mod auth;
use sealnote::{
    EncryptedNote, FileKeyStore, KdfParams, Note, OsRandom, RegistrationEnvelope, Session,
    default_store_path, lifecycle,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sealnote")]
#[command(
    version,
    about = "Client-side key hierarchy and note encryption for end-to-end encrypted notes."
)]
struct Cli {
    /// Path to the device key store file
    #[arg(long, global = true, value_name = "PATH", env = "SEALNOTE_DEVICE_STORE")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Creates a new master key and prints its registration envelope
    Register {
        /// PBKDF2 iterations (minimum and default: 300000)
        #[arg(long)]
        iterations: Option<u32>,

        /// Write the envelope to a file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Unlocks the master key with the password and pairs this device
    #[command(arg_required_else_help = true)]
    Login {
        /// Registration envelope returned by the server
        #[arg(long, value_name = "FILE")]
        envelope: PathBuf,
    },

    /// Checks that the device pair unlocks without a password
    Resume,

    /// Forgets the device pair
    Logout,

    /// Encrypts a new note and prints its payload
    #[command(arg_required_else_help = true)]
    New {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        content: String,
    },

    /// Re-encrypts an edited note under its existing note key
    #[command(arg_required_else_help = true)]
    Edit {
        /// Encrypted note as returned by the server
        file: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },

    /// Decrypts a note and prints it
    #[command(arg_required_else_help = true)]
    Decrypt { file: PathBuf },

    /// Decrypts the titles of a list of notes
    #[command(arg_required_else_help = true)]
    Previews { file: PathBuf },
}

fn resolve_store(path: Option<PathBuf>) -> Result<FileKeyStore> {
    match path {
        Some(p) => Ok(FileKeyStore::new(p)),
        None => Ok(FileKeyStore::new(default_store_path()?)),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SEALNOTE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Opens a session unlocked from the device pair.
fn resumed_session(store: Option<PathBuf>) -> Result<Session<FileKeyStore>> {
    let mut session = Session::new(resolve_store(store)?);
    session.resume().context("no unlocked device; run `sealnote login` first")?;
    Ok(session)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Cli::parse();
    match args.command {
        Commands::Register { iterations, out } => {
            let kdf = match iterations {
                Some(n) => KdfParams::new(n)?,
                None => KdfParams::default(),
            };
            let password = auth::read_new_password_with_confirmation()?;
            let envelope = lifecycle::register(&password, kdf, &OsRandom)?;

            match out {
                Some(path) => {
                    let json = serde_json::to_vec_pretty(&envelope)?;
                    fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("registration envelope written to {}", path.display());
                }
                None => print_json(&envelope)?,
            }
        }
        Commands::Login { envelope } => {
            let envelope: RegistrationEnvelope = read_json(&envelope)?;
            let password = auth::read_password()?;
            let mut session = Session::new(resolve_store(args.store)?);
            session.login(&password, &envelope)?;
            println!("logged in; device paired at {}", session.store().path().display());
        }
        Commands::Resume => {
            resumed_session(args.store)?;
            println!("session resumed");
        }
        Commands::Logout => {
            let mut session = Session::new(resolve_store(args.store)?);
            session.logout()?;
            println!("logged out");
        }
        Commands::New { title, content } => {
            let session = resumed_session(args.store)?;
            let payload = session.new_note(&title, &content)?;
            print_json(&payload)?;
        }
        Commands::Edit {
            file,
            title,
            content,
        } => {
            let session = resumed_session(args.store)?;
            let encrypted: EncryptedNote = read_json(&file)?;
            let current = session.decrypt(&encrypted)?;

            let edited = Note {
                title: title.unwrap_or(current.title),
                content: content.unwrap_or(current.content),
                ..current
            };
            let updated = session.reencrypt(&edited, &encrypted.note_key)?;
            print_json(&updated)?;
        }
        Commands::Decrypt { file } => {
            let session = resumed_session(args.store)?;
            let encrypted: EncryptedNote = read_json(&file)?;
            let note = session.decrypt(&encrypted)?;
            print_json(&note)?;
        }
        Commands::Previews { file } => {
            let session = resumed_session(args.store)?;
            let encrypted: Vec<EncryptedNote> = read_json(&file)?;

            for (note, preview) in encrypted.iter().zip(session.batch_decrypt_previews(&encrypted)?) {
                let id = note.id.map_or_else(|| "-".to_string(), |id| id.to_string());
                match preview {
                    Ok(preview) => println!("{id}\t{}", preview.title),
                    Err(e) => println!("{id}\t<{e}>"),
                }
            }
        }
    }

    Ok(())
}
