mod log;

use clap::{Arg, ArgAction, ArgGroup, Command};
use ::log::{error, info};

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::mpsc::channel;
use std::sync::Arc;

use workerpool::Pool;
use workerpool::thunk::{Thunk, ThunkWorker};
use zeroize::Zeroizing;

use crypto::{
    BlockCipher,
    CipherError,
    BLOCK_SIZE256,
    TWEAK_SIZE,
    secure::SecretBytes,
    threefish256::Threefish256,
};

const TWEAK: [u8; 16] = [61,76,51,71,52,61,75,88,13,7,3,1,5,241,177,23];
const EXTENSION: &str = "tf";

#[derive(Debug)]
enum AppError {
    Cipher(CipherError),
    Io(String),
    Input(String),
}

impl std::error::Error for AppError {}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::Cipher(e) => write!(f, "Cipher error: {}", e),
            AppError::Io(msg) => write!(f, "IO error: {}", msg),
            AppError::Input(msg) => write!(f, "Input error: {}", msg),
        }
    }
}

impl From<CipherError> for AppError {
    fn from(e: CipherError) -> Self {
        AppError::Cipher(e)
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

struct Args {
    decrypt: bool,
    key: Arc<SecretBytes>,
    tweak: [u8; TWEAK_SIZE],
    threads: usize,
    output: PathBuf,
    sources: Vec<PathBuf>,
}

fn parse_key(hex_key: &str) -> Result<SecretBytes, AppError> {
    let key = hex::decode(hex_key.trim())
        .map(Zeroizing::new)
        .map_err(|e| AppError::Input(format!("key is not valid hex: {}", e)))?;

    if key.len() != BLOCK_SIZE256 {
        return Err(AppError::Input(format!(
            "key must be {} bytes ({} hex characters), got {} bytes",
            BLOCK_SIZE256,
            BLOCK_SIZE256 * 2,
            key.len()
        )));
    }

    Ok(SecretBytes::new(&key)?)
}

/// Reads the hex key from `path`, or from stdin when `path` is `-`.
fn read_key_file(path: &str) -> Result<SecretBytes, AppError> {
    // room for the key and a newline, so the buffer never reallocates
    let mut text = Zeroizing::new(String::with_capacity(4 * BLOCK_SIZE256));

    if path == "-" {
        io::stdin().lock().read_to_string(&mut text)?;
    } else {
        fs::File::open(path)?.read_to_string(&mut text)?;
    }

    parse_key(&text)
}

fn parse_tweak(tweak: &str) -> Result<[u8; TWEAK_SIZE], AppError> {
    tweak.as_bytes().try_into().map_err(|_| {
        AppError::Input(format!("tweak must be exactly {} bytes", TWEAK_SIZE))
    })
}

/// Encrypted files get a `.tf` suffix; decryption strips it again
/// or appends `.out` when it is missing.
fn output_path(source: &Path, output_dir: &Path, decrypt: bool) -> Result<PathBuf, AppError> {
    let name = source
        .file_name()
        .ok_or_else(|| AppError::Input(format!("{} is not a file", source.display())))?;

    let target = if !decrypt {
        let mut name = name.to_os_string();
        name.push(".");
        name.push(EXTENSION);
        output_dir.join(name)
    } else if source.extension().map_or(false, |ext| ext == EXTENSION) {
        match source.file_stem() {
            Some(stem) => output_dir.join(stem),
            None => output_dir.join(name),
        }
    } else {
        let mut name = name.to_os_string();
        name.push(".out");
        output_dir.join(name)
    };

    Ok(target)
}

fn process_file(source: &Path, output_dir: &Path, key: &SecretBytes, tweak: &[u8], decrypt: bool) -> Result<PathBuf, AppError> {
    let cipher = Threefish256::with_tweak(key.as_slice(), tweak)?;

    let data = fs::read(source)?;
    let result = if decrypt {
        cipher.decrypt(&data)?
    } else {
        cipher.encrypt(&data)?
    };

    let target = output_path(source, output_dir, decrypt)?;
    fs::write(&target, &result)?;

    Ok(target)
}

fn run(args: Args) -> Result<usize, AppError> {
    fs::create_dir_all(&args.output)?;

    let workers = Pool::<ThunkWorker<(PathBuf, Result<PathBuf, AppError>)>>::new(args.threads.max(1));
    let n_jobs = args.sources.len();

    info!("Total files: {}", n_jobs);

    let (tx, rx) = channel();
    for source in args.sources {
        let key = args.key.clone();
        let tweak = args.tweak;
        let output = args.output.clone();
        let decrypt = args.decrypt;

        workers.execute_to(tx.clone(), Thunk::of(move || {
            let result = process_file(&source, &output, &key, &tweak, decrypt);
            (source, result)
        }));
    }

    let mut without_errors = 0;
    for (source, result) in rx.iter().take(n_jobs) {
        match result {
            Ok(target) => {
                without_errors += 1;
                info!("Files finished: {}/{}, {} -> {}", without_errors, n_jobs, source.display(), target.display());
            },
            Err(AppError::Cipher(e)) if args.decrypt => {
                error!("Error while decrypting {}: {}. Maybe your key or tweak is incorrect!", source.display(), e);
            },
            Err(e) => {
                error!("Error while processing {}: {}", source.display(), e);
            }
        }
    }

    Ok(without_errors)
}

fn get_args() -> Result<Args, AppError> {
    let matches = Command::new("tf_vault")
        .about("Encrypts and decrypts files with Threefish-256 in CBC mode")
        .arg(Arg::new("decrypt")
            .short('d')
            .long("decrypt")
            .action(ArgAction::SetTrue)
            .help("Decrypt the source files instead of encrypting them"))
        .arg(Arg::new("key")
            .short('k')
            .long("key")
            .num_args(1)
            .help("Key as 64 hex characters. Visible in the process list, prefer --key-file"))
        .arg(Arg::new("key_file")
            .short('K')
            .long("key-file")
            .num_args(1)
            .help("File holding the key as 64 hex characters, '-' reads stdin"))
        .group(ArgGroup::new("key_source")
            .args(["key", "key_file"])
            .required(true))
        .arg(Arg::new("tweak")
            .short('t')
            .long("tweak")
            .num_args(1)
            .help("Tweak, exactly 16 characters. Default: built-in tweak"))
        .arg(Arg::new("threads")
            .short('T')
            .long("threads")
            .value_parser(clap::value_parser!(u32))
            .default_value("4")
            .help("Number of worker threads. Default: 4"))
        .arg(Arg::new("output")
            .short('o')
            .long("output")
            .num_args(1)
            .required(true)
            .help("Directory the results are written to"))
        .arg(Arg::new("source")
            .short('s')
            .long("source")
            .num_args(1..)
            .required(true)
            .help("Files to process"))
        .get_matches();

    let decrypt = matches.get_flag("decrypt");
    let threads: u32 = *matches.get_one::<u32>("threads").unwrap_or(&4);

    let key = match (matches.get_one::<String>("key"), matches.get_one::<String>("key_file")) {
        (Some(hex_key), _) => parse_key(hex_key)?,
        (None, Some(path)) => read_key_file(path)?,
        (None, None) => return Err(AppError::Input("key is required".to_string())),
    };

    let tweak = match matches.get_one::<String>("tweak") {
        Some(t) => parse_tweak(t)?,
        None => TWEAK,
    };

    let output = matches
        .get_one::<String>("output")
        .ok_or_else(|| AppError::Input("output is required".to_string()))?;

    let sources = matches
        .get_many::<String>("source")
        .ok_or_else(|| AppError::Input("at least one source is required".to_string()))?
        .map(PathBuf::from)
        .collect();

    Ok(Args {
        decrypt,
        key: Arc::new(key),
        tweak,
        threads: threads as usize,
        output: PathBuf::from(output),
        sources,
    })
}

fn main() {
    log::init();

    let args = match get_args() {
        Ok(args) => args,
        Err(e) => {
            error!("{}", e);
            process::exit(2);
        }
    };

    let n_jobs = args.sources.len();
    if args.decrypt {
        info!("Started decrypt process...");
    } else {
        info!("Started encrypt process...");
    }

    match run(args) {
        Ok(done) if done == n_jobs => info!("Process done!"),
        Ok(done) => {
            error!("{} of {} files failed", n_jobs - done, n_jobs);
            process::exit(1);
        },
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
