use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

pub const PF_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\nGlobal options:\n{options}\n";

pub const PF_BEFORE_HELP: &str = concat!(
    "pf ",
    env!("CARGO_PKG_VERSION"),
    " – Android firmware inspection and support tooling\n\n",
    "\x1b[1;36mImages\x1b[0m\n",
    "  locate           Find a member such as boot.img inside a firmware or ROM package.\n",
    "  sha1             Read the SHA1= build hash embedded in a boot image.\n",
    "  fingerprint      Read the build fingerprint embedded in a boot image.\n",
    "  digest           Compute MD5, SHA-1 and SHA-256 of a file.\n",
    "  confidence       Compare an expected hash with an extracted one.\n\n",
    "\x1b[1;36mProvenance\x1b[0m\n",
    "  store            Initialize, list, track or purge boot image provenance.\n\n",
    "\x1b[1;36mSupport\x1b[0m\n",
    "  sanitize         Redact user names and device serials from files or a store copy.\n",
    "  support          Build support.zip with redacted logs, settings and store.\n",
    "  which            Resolve an executable on PATH.\n",
    "  ui-coords        Centre of a labelled node in a uiautomator dump.\n",
    "  clean            Empty the working tmp/ directory.\n",
);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    propagate_version = false,
    disable_help_subcommand = true,
    before_help = PF_BEFORE_HELP,
    help_template = PF_HELP_TEMPLATE
)]
pub struct PfCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)", global = true)]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[command(subcommand)]
    pub command: CommandCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandCli {
    #[command(about = "Find a member inside a zip or tar package, optionally in nested archives.")]
    Locate(LocateArgs),
    #[command(about = "Read the SHA1= build hash embedded in a boot image.")]
    Sha1(Sha1Args),
    #[command(about = "Read the build fingerprint embedded in a boot image.")]
    Fingerprint(ImageArgs),
    #[command(about = "Compute MD5, SHA-1 and SHA-256 of a file.")]
    Digest(ImageArgs),
    #[command(about = "Fraction of matching characters between two equal-length hashes.")]
    Confidence(ConfidenceArgs),
    #[command(about = "Redact user names and device serials in place.")]
    Sanitize(SanitizeArgs),
    #[command(about = "Build support.zip from redacted copies of settings, store and logs.")]
    Support,
    #[command(about = "Resolve an executable on PATH.")]
    Which(WhichArgs),
    #[command(name = "ui-coords", about = "Centre of a labelled node in a uiautomator dump.")]
    UiCoords(UiCoordsArgs),
    #[command(about = "Empty the working tmp/ directory.")]
    Clean,
    #[command(subcommand, about = "Boot image provenance store.")]
    Store(StoreCommand),
}

#[derive(Args, Debug)]
pub struct LocateArgs {
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,
    #[arg(value_name = "MEMBER", help = "Member name, e.g. boot.img or init_boot.img")]
    pub member: String,
    #[arg(long, help = "Descend into nested zip and tar archives")]
    pub nested: bool,
}

#[derive(Args, Debug)]
pub struct ImageArgs {
    #[arg(value_name = "FILE")]
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct Sha1Args {
    #[arg(value_name = "IMAGE")]
    pub path: PathBuf,
    #[arg(long, default_value_t = 8, help = "Number of characters to read after SHA1=")]
    pub length: usize,
    #[arg(long, value_name = "HASH", help = "Report match confidence against this hash")]
    pub expected: Option<String>,
}

#[derive(Args, Debug)]
pub struct ConfidenceArgs {
    pub expected: String,
    pub extracted: String,
}

#[derive(Args, Debug)]
pub struct SanitizeArgs {
    #[arg(value_name = "FILE", required_unless_present = "store")]
    pub files: Vec<PathBuf>,
    #[arg(long, value_name = "DB", help = "Redact file paths in a copy of the provenance store")]
    pub store: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct WhichArgs {
    pub name: String,
}

#[derive(Args, Debug)]
pub struct UiCoordsArgs {
    #[arg(value_name = "XML")]
    pub dump: PathBuf,
    pub label: String,
}

#[derive(Subcommand, Debug)]
pub enum StoreCommand {
    #[command(about = "Create the store (if needed) and verify its schema.")]
    Init,
    #[command(about = "List boot images with the packages that carried them.")]
    List,
    #[command(about = "Record a boot image extracted from a package.")]
    Track(TrackArgs),
    #[command(about = "Remove a boot image or package and its associations.")]
    Purge(PurgeArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PackageKindArg {
    Firmware,
    Rom,
}

#[derive(Args, Debug)]
pub struct TrackArgs {
    #[arg(long, value_name = "ARCHIVE")]
    pub package: PathBuf,
    #[arg(long = "type", value_enum, default_value_t = PackageKindArg::Firmware)]
    pub kind: PackageKindArg,
    #[arg(long, value_name = "SIG", help = "Build signature of the package")]
    pub sig: String,
    #[arg(long, value_name = "IMAGE")]
    pub boot: PathBuf,
    #[arg(long, help = "The boot image is Magisk-patched")]
    pub patched: bool,
    #[arg(long, value_name = "VERSION")]
    pub magisk: Option<String>,
    #[arg(long, value_name = "DEVICE")]
    pub hardware: Option<String>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct PurgeArgs {
    #[arg(long, value_name = "ID")]
    pub boot: Option<i64>,
    #[arg(long, value_name = "ID")]
    pub package: Option<i64>,
}
