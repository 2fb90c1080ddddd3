use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Subcommand};
use mxfkit_dict::Dictionary;

use crate::exit::{dict_error, io_error, CliResult};
use crate::output::OutputFormat;

pub mod dump;
pub mod keys;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode an MXF file into a stream of objects.
    Dump(DumpArgs),
    /// List the KLV records of an MXF file without decoding them.
    Keys(KeysArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Dump(args) => dump::run(args, format),
        Command::Keys(args) => keys::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// MXF file to read.
    pub path: PathBuf,
    /// Include KLV fill records in the output.
    #[arg(long)]
    pub filler: bool,
    /// Print only the decoded fields of each record.
    #[arg(long)]
    pub flatten: bool,
    /// Directory of JSON registry files layered over the built-in dictionary.
    #[arg(long, value_name = "DIR")]
    pub dictionary: Option<PathBuf>,
    /// Treat local tags missing from the dictionary as record errors.
    #[arg(long)]
    pub strict: bool,
    /// Stop at the first record that fails to decode.
    #[arg(long)]
    pub fail_fast: bool,
    /// Treat values longer than this many bytes as corrupt. Unbounded by default.
    #[arg(long, value_name = "BYTES")]
    pub max_value_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct KeysArgs {
    /// MXF file to read.
    pub path: PathBuf,
    /// Directory of JSON registry files layered over the built-in dictionary.
    #[arg(long, value_name = "DIR")]
    pub dictionary: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show build details.
    #[arg(long)]
    pub extended: bool,
}

/// The built-in dictionary, extended with any registry files in `extra`.
fn load_dictionary(extra: Option<&Path>) -> CliResult<Arc<Dictionary>> {
    let mut dictionary =
        Dictionary::baseline().map_err(|err| dict_error("built-in dictionary", err))?;
    if let Some(dir) = extra {
        dictionary
            .load_directory(dir)
            .map_err(|err| dict_error(&format!("dictionary {}", dir.display()), err))?;
    }
    Ok(Arc::new(dictionary))
}

fn open(path: &Path) -> CliResult<File> {
    File::open(path).map_err(|err| io_error(&format!("open {}", path.display()), err))
}

/// Fill keys are reported under their dictionary symbols.
fn is_filler(symbol: Option<&str>) -> bool {
    matches!(symbol, Some("KLVFill" | "KLVFillOld"))
}
