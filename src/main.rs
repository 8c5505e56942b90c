use bitcrypt::device::{device_size, lba_offset, read_lba, verify_mirror, KeyWriter, LbaRange};
use bitcrypt::{CancelToken, ConsoleReporter, EncryptOptions, Encryptor};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Version info from build.rs
const VERSION: &str = env!("BITCRYPT_VERSION");
const BUILD: &str = env!("BITCRYPT_BUILD");
const PROFILE: &str = env!("BITCRYPT_PROFILE");
const GIT_HASH: &str = env!("BITCRYPT_GIT_HASH");

/// Combined version string (compile-time concatenation not possible, so we build at runtime)
fn get_version() -> &'static str {
    use std::sync::OnceLock;
    static VERSION_STRING: OnceLock<String> = OnceLock::new();
    VERSION_STRING.get_or_init(|| {
        format!("{} {} build {} ({})", PROFILE, VERSION, BUILD, GIT_HASH)
    })
}

#[derive(Parser)]
#[command(name = "bitcrypt")]
#[command(author, about = "Streaming bitwise file and device encryption", long_about = None)]
struct Cli {
    /// Print version
    #[arg(short = 'V', long)]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt or decrypt files against a key file
    #[command(alias = "e")]
    Encrypt {
        /// Key file (raw bytes, any non-empty file)
        #[arg(short, long, required = true)]
        key_file: PathBuf,

        /// Files to process; ".bit" files are decrypted, others encrypted
        #[arg(required = true)]
        targets: Vec<PathBuf>,

        /// Chunk size in bytes for all reads and writes
        #[arg(long, default_value = "1048576", value_parser = parse_buffer_size)]
        buffer_size: usize,

        /// Follow symlinked targets instead of skipping them
        #[arg(long)]
        allow_symlinks: bool,

        /// List what would be processed without touching anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Write a key file redundantly onto a raw device
    #[command(alias = "w")]
    WriteKey {
        /// Key file to deploy
        #[arg(short, long, required = true)]
        key_file: PathBuf,

        /// Block device or image file
        device: PathBuf,

        /// First target region, inclusive LBA range (e.g. 2048:4095)
        #[arg(long, required = true, value_parser = parse_lba_range, allow_hyphen_values = true)]
        first: LbaRange,

        /// Second target region (negative LBAs count from the device end)
        #[arg(long, required = true, value_parser = parse_lba_range, allow_hyphen_values = true)]
        second: LbaRange,

        /// Chunk size in bytes for all reads and writes
        #[arg(long, default_value = "1048576", value_parser = parse_buffer_size)]
        buffer_size: usize,
    },

    /// Compare the two key regions of a device
    #[command(alias = "v")]
    VerifyKey {
        /// Block device or image file
        device: PathBuf,

        /// First region, inclusive LBA range
        #[arg(long, required = true, value_parser = parse_lba_range, allow_hyphen_values = true)]
        first: LbaRange,

        /// Second region, inclusive LBA range
        #[arg(long, required = true, value_parser = parse_lba_range, allow_hyphen_values = true)]
        second: LbaRange,

        /// Number of bytes to compare
        #[arg(long)]
        length: Option<u64>,

        /// Key file whose size gives the number of bytes to compare
        #[arg(short, long, conflicts_with = "length")]
        key_file: Option<PathBuf>,
    },

    /// Hex dump sectors of a device
    #[command(alias = "r")]
    ReadDevice {
        /// Block device or image file
        device: PathBuf,

        /// Starting LBA (negative counts from the device end)
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        lba: i64,

        /// Number of bytes to dump
        #[arg(long, default_value = "512")]
        length: usize,
    },
}

fn parse_buffer_size(s: &str) -> Result<usize, String> {
    let size: usize = s.parse().map_err(|e| format!("{}", e))?;
    if size == 0 {
        return Err("buffer size must be greater than zero".to_string());
    }
    Ok(size)
}

fn parse_lba_range(s: &str) -> Result<LbaRange, String> {
    s.parse().map_err(|e| format!("{}", e))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Handle --version flag
    if cli.version {
        println!("bitcrypt {}", get_version());
        return ExitCode::SUCCESS;
    }

    // Require a command if not showing version
    let command = match cli.command {
        Some(cmd) => cmd,
        None => {
            // Show help when no command provided
            use clap::CommandFactory;
            Cli::command().print_help().unwrap();
            println!();
            return ExitCode::SUCCESS;
        }
    };

    let result = match command {
        Commands::Encrypt {
            key_file,
            targets,
            buffer_size,
            allow_symlinks,
            dry_run,
        } => {
            let options = EncryptOptions {
                buffer_size,
                allow_symlinks,
                dry_run,
            };
            let encryptor = Encryptor::new(
                options,
                Arc::new(ConsoleReporter::new()),
                CancelToken::new(),
            );

            match encryptor.encrypt_selection(&targets, &key_file) {
                Ok(summary) => {
                    if summary.stopped {
                        println!(
                            "Stopped after {} of {} file(s)",
                            summary.files_processed, summary.files_selected
                        );
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }

        Commands::WriteKey {
            key_file,
            device,
            first,
            second,
            buffer_size,
        } => {
            let writer = KeyWriter::new(
                buffer_size,
                Arc::new(ConsoleReporter::new()),
                CancelToken::new(),
            );

            match writer.write_key(&key_file, &device, first, second) {
                Ok(()) => {
                    println!(
                        "Key written to {} at {} and {}",
                        device.display(),
                        first,
                        second
                    );
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }

        Commands::VerifyKey {
            device,
            first,
            second,
            length,
            key_file,
        } => {
            let length = match (length, key_file) {
                (Some(length), _) => length,
                (None, Some(key_file)) => match fs::metadata(&key_file) {
                    Ok(meta) => meta.len(),
                    Err(e) => {
                        eprintln!("Error: reading key {}: {}", key_file.display(), e);
                        return ExitCode::FAILURE;
                    }
                },
                (None, None) => {
                    eprintln!("Error: either --length or --key-file is required");
                    return ExitCode::FAILURE;
                }
            };

            match verify_mirror(&device, first, second, length) {
                Ok(None) => {
                    println!("Regions match over {} bytes", length);
                    Ok(())
                }
                Ok(Some(offset)) => {
                    println!("Regions differ at byte {}", offset);
                    return ExitCode::FAILURE;
                }
                Err(e) => Err(e),
            }
        }

        Commands::ReadDevice {
            device,
            lba,
            length,
        } => {
            let dump = device_size(&device)
                .and_then(|size| lba_offset(size, lba))
                .and_then(|start| read_lba(&device, lba, length).map(|bytes| (start, bytes)));

            match dump {
                Ok((start, bytes)) => {
                    for (i, row) in bytes.chunks(16).enumerate() {
                        println!("{:08x}  {}", start + (i * 16) as u64, hex::encode(row));
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
