//! pdfseal - detect, apply and remove PDF passwords
//!
//! A command line front end for `pdfseal-core`. Reads a PDF from disk,
//! runs one protection operation and writes JSON or a new PDF.

use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use pdfseal_core::{ErrorKind, PdfError, Permissions, ProtectionService, SecurityLevel, SetPasswordOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_MAX_SIZE: usize = 100 * 1024 * 1024;

/// Encryption level offered for writing.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Level {
    /// 40-bit RC4 (revision 2)
    #[value(name = "rc4-40")]
    Rc4_40,
    /// 128-bit RC4 (revision 3)
    #[value(name = "rc4-128")]
    Rc4_128,
    /// 128-bit AES (revision 4)
    #[value(name = "aes-128")]
    Aes128,
}

impl From<Level> for SecurityLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Rc4_40 => Self::Rc4_40,
            Level::Rc4_128 => Self::Rc4_128,
            Level::Aes128 => Self::Aes128,
        }
    }
}

/// Detect, apply and remove PDF passwords.
#[derive(Parser, Debug)]
#[command(name = "pdfseal")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Use debug logging level
    #[arg(short = 'v', long, action = ArgAction::SetTrue, global = true)]
    verbose: bool,

    /// Refuse input files larger than this many bytes
    #[arg(long = "max-size", default_value_t = DEFAULT_MAX_SIZE, global = true)]
    max_size: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report whether a view or permission password is set (JSON)
    Detect {
        file: PathBuf,
        /// View password used to probe permissions
        #[arg(short = 'p', long)]
        password: Option<String>,
    },
    /// Print the security attributes of a document (JSON)
    Info {
        file: PathBuf,
        #[arg(short = 'p', long)]
        password: Option<String>,
    },
    /// Protect an unencrypted document
    Lock {
        file: PathBuf,
        /// Password needed to open the document
        #[arg(short = 'u', long = "user")]
        user: String,
        /// Password granting full access (defaults to the user password)
        #[arg(short = 'o', long = "owner")]
        owner: Option<String>,
        #[arg(short = 'l', long, value_enum, default_value = "rc4-128")]
        level: Level,
        /// Comma-separated permissions to withhold, e.g. "print,modify"
        #[arg(long, value_delimiter = ',')]
        deny: Vec<String>,
        /// Output path (default: <stem>_protected.pdf)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Remove protection using the owner password
    Unlock {
        file: PathBuf,
        #[arg(short = 'p', long)]
        password: String,
        /// Output path (default: <stem>_unlocked.pdf)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Exit status for a failure, by error kind.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<PdfError>().map(PdfError::kind) {
        Some(ErrorKind::Structural) => 1,
        Some(ErrorKind::Password) => 3,
        Some(ErrorKind::AlreadyProtected) => 4,
        Some(ErrorKind::NotProtected) => 5,
        Some(ErrorKind::Resource) => 6,
        None => 1,
    }
}

fn read_input(path: &Path, max_size: usize) -> anyhow::Result<Vec<u8>> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("cannot stat {}", path.display()))?
        .len();
    let size = usize::try_from(size).unwrap_or(usize::MAX);
    if size > max_size {
        return Err(PdfError::InputTooLarge { size, limit: max_size })
            .with_context(|| format!("refusing to read {}", path.display()));
    }
    std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))
}

/// `<dir>/<stem><suffix>.pdf` next to the input.
fn derived_output(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{stem}{suffix}.pdf"))
}

/// Reject output file names the destination filesystem may not accept.
fn check_file_name(path: &Path) -> anyhow::Result<()> {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        bail!("output path {} has no file name", path.display());
    };
    if let Some(bad) = name
        .chars()
        .find(|c| c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*'))
    {
        bail!("output file name {name:?} contains illegal character {bad:?}");
    }
    Ok(())
}

fn parse_denied(labels: &[String]) -> anyhow::Result<Permissions> {
    let mut denied = Permissions::empty();
    for label in labels.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        match Permissions::from_label(label) {
            Some(flag) => denied |= flag,
            None => bail!("unknown permission '{label}'"),
        }
    }
    Ok(Permissions::all() - denied)
}

fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    check_file_name(path)?;
    std::fs::write(path, bytes).with_context(|| format!("cannot write {}", path.display()))?;
    info!(path = %path.display(), size = bytes.len(), "wrote output");
    println!("{}", path.display());
    Ok(())
}

fn run(args: Args) -> anyhow::Result<()> {
    let service = ProtectionService::new().with_max_input_bytes(args.max_size);
    match args.command {
        Command::Detect { file, password } => {
            let bytes = read_input(&file, args.max_size)?;
            let status = service
                .detect_protection(&bytes, password.as_deref())
                .with_context(|| format!("cannot inspect {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Info { file, password } => {
            let bytes = read_input(&file, args.max_size)?;
            let report = service
                .describe_security(&bytes, password.as_deref())
                .with_context(|| format!("cannot inspect {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Lock {
            file,
            user,
            owner,
            level,
            deny,
            output,
        } => {
            let mut options = SetPasswordOptions::new(user)
                .level(level.into())
                .permissions(parse_denied(&deny)?);
            options.owner_password = owner;
            let bytes = read_input(&file, args.max_size)?;
            let locked = service
                .set_password(&bytes, &options)
                .with_context(|| format!("cannot protect {}", file.display()))?;
            let output = output.unwrap_or_else(|| derived_output(&file, "_protected"));
            write_output(&output, &locked)?;
        }
        Command::Unlock { file, password, output } => {
            let bytes = read_input(&file, args.max_size)?;
            let unlocked = service
                .remove_password(&bytes, &password)
                .with_context(|| format!("cannot unlock {}", file.display()))?;
            let output = output.unwrap_or_else(|| derived_output(&file, "_unlocked"));
            write_output(&output, &unlocked)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_names_follow_input_stem() {
        let out = derived_output(Path::new("/tmp/report.pdf"), "_protected");
        assert_eq!(out, PathBuf::from("/tmp/report_protected.pdf"));
        let out = derived_output(Path::new("scan"), "_unlocked");
        assert_eq!(out, PathBuf::from("scan_unlocked.pdf"));
    }

    #[test]
    fn illegal_output_names_are_rejected() {
        assert!(check_file_name(Path::new("out/report_unlocked.pdf")).is_ok());
        assert!(check_file_name(Path::new("what?.pdf")).is_err());
        assert!(check_file_name(Path::new("a\u{7}.pdf")).is_err());
    }

    #[test]
    fn denied_permissions_are_removed() {
        let perms = parse_denied(&["print".into(), " modify".into()]).expect("labels");
        assert!(!perms.contains(Permissions::PRINT));
        assert!(!perms.contains(Permissions::MODIFY));
        assert!(perms.contains(Permissions::COPY));
        assert!(parse_denied(&["fly".into()]).is_err());
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        let err = anyhow::Error::new(PdfError::IncorrectPassword).context("cannot unlock x.pdf");
        assert_eq!(exit_code(&err), 3);
        let err = anyhow::Error::new(PdfError::NotProtected);
        assert_eq!(exit_code(&err), 5);
        assert_eq!(exit_code(&anyhow::anyhow!("io")), 1);
    }

    #[test]
    fn cli_parses_lock() {
        let args = Args::try_parse_from([
            "pdfseal", "lock", "in.pdf", "-u", "a", "-o", "b", "--level", "aes-128", "--deny", "print,copy",
        ])
        .expect("parse");
        match args.command {
            Command::Lock { level, deny, .. } => {
                assert!(matches!(level, Level::Aes128));
                assert_eq!(deny, ["print", "copy"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
