use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOpts {
    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "Directory holding config.json and templates (default: <user config dir>/codepack).",
        conflicts_with = "no_config"
    )]
    pub config_dir: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "Ignore the stored configuration and never write it."
    )]
    pub no_config: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ScanOpts {
    #[arg(
        long,
        help = "Project directory to scan (default: $PROJECT_ROOT, then the current dir).",
        help_heading = "Scanning",
        value_name = "PATH"
    )]
    pub root: Option<PathBuf>,

    #[arg(
        long,
        help = "Number of scan worker threads.",
        help_heading = "Scanning",
        value_name = "N"
    )]
    pub workers: Option<usize>,

    #[arg(
        long,
        help = "Files handed to a worker at a time.",
        help_heading = "Scanning",
        value_name = "N"
    )]
    pub batch_size: Option<usize>,

    #[arg(long = "exclude-dir", value_name = "NAME", action = clap::ArgAction::Append, help = "Additional directory name to skip.", help_heading = "Scanning")]
    pub exclude_dirs: Vec<String>,

    #[arg(long = "ext", value_name = "EXT", action = clap::ArgAction::Append, help = "Extension to include; replaces the configured set.", help_heading = "Scanning")]
    pub extensions: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SelectionOpts {
    #[arg(
        long,
        help = "Select every scanned file.",
        help_heading = "Selection"
    )]
    pub all: bool,

    #[arg(
        long,
        value_name = "TEXT",
        help = "Select files whose name, path or layer contains TEXT (3+ characters).",
        help_heading = "Selection"
    )]
    pub search: Option<String>,

    #[arg(long = "glob", value_name = "PATTERN", action = clap::ArgAction::Append, help = "Select files whose root-relative path matches PATTERN.", help_heading = "Selection")]
    pub globs: Vec<String>,

    #[arg(
        long,
        value_name = "CSV",
        help = "Select the files listed in a selection CSV.",
        help_heading = "Selection"
    )]
    pub from_csv: Option<PathBuf>,

    #[arg(
        long,
        value_name = "NAME",
        help = "Select the files matching a saved template.",
        help_heading = "Selection"
    )]
    pub template: Option<String>,
}

impl SelectionOpts {
    pub fn is_empty(&self) -> bool {
        !self.all
            && self.search.is_none()
            && self.globs.is_empty()
            && self.from_csv.is_none()
            && self.template.is_none()
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct FormatOpts {
    #[arg(short = 'f', long, help = "Set the output format.", value_name = "FORMAT", value_parser = ["text", "json"], help_heading = "Output Formatting")]
    pub format: Option<String>,
}

impl FormatOpts {
    pub fn is_json(&self) -> bool {
        self.format.as_deref() == Some("json")
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "codepack",
    author,
    version,
    about = "Bundle selected source files into plain-text exports.",
    long_about = "codepack scans a project for source files, lets you pick a subset \n(by glob, search text, saved template or CSV) and concatenates them into \nBOM-prefixed text exports, optionally grouped by folder or layer.",
    help_template = "{about-section}\nUsage: {usage}\n\n{all-args}{after-help}",
    after_help = "EXAMPLES:\n  codepack scan --root ./app\n  codepack export --glob 'src/**/*.py' --group-by folder -o ./out\n  codepack template create api --glob 'api/**'\n  codepack export --template api",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[clap(flatten)]
    pub global: GlobalOpts,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase message verbosity (-v, -vv, -vvv).")]
    pub verbose: u8,

    #[arg(
        short,
        long,
        global = true,
        help = "Silence informational messages and warnings."
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    #[command(visible_alias = "s", about = "Scan a project and list the supported files.")]
    Scan(ScanArgs),

    #[command(
        visible_alias = "e",
        about = "Export the selected files into text bundles."
    )]
    Export(ExportArgs),

    #[command(visible_alias = "t", about = "Show the folder tree of scanned files.")]
    Tree(TreeArgs),

    #[command(about = "Show file counts, sizes and token estimates.")]
    Stats(StatsArgs),

    #[command(about = "Manage saved selection templates.")]
    Template(TemplateArgs),

    #[command(about = "Save or load a selection as CSV.")]
    Selection(SelectionArgs),

    #[command(about = "Show or change the stored configuration.")]
    Config(ConfigArgs),

    #[command(about = "Generate or save shell completion scripts.")]
    Completion(CompletionArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    #[clap(flatten)]
    pub scan: ScanOpts,
    #[clap(flatten)]
    pub selection: SelectionOpts,
    #[clap(flatten)]
    pub format: FormatOpts,

    #[arg(long, help = "Add a git status column.")]
    pub git: bool,

    #[arg(long, help = "List only the selected files.")]
    pub selected: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    #[clap(flatten)]
    pub scan: ScanOpts,
    #[clap(flatten)]
    pub selection: SelectionOpts,

    #[arg(long, value_name = "MODE", value_parser = ["none", "folder", "layer"], help = "Split the export into one file per folder or layer.", help_heading = "Output Control")]
    pub group_by: Option<String>,

    #[arg(
        long,
        value_name = "NAME",
        help = "Name of the single export file (default: export_<timestamp>).",
        help_heading = "Output Control"
    )]
    pub name: Option<String>,

    #[arg(
        short = 'o',
        long,
        value_name = "DIR",
        help = "Output directory (default: configured export dir, then <config dir>/exports).",
        help_heading = "Output Control"
    )]
    pub output_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct TreeArgs {
    #[clap(flatten)]
    pub scan: ScanOpts,
    #[clap(flatten)]
    pub selection: SelectionOpts,
    #[clap(flatten)]
    pub format: FormatOpts,
}

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    #[clap(flatten)]
    pub scan: ScanOpts,
    #[clap(flatten)]
    pub selection: SelectionOpts,
    #[clap(flatten)]
    pub format: FormatOpts,
}

#[derive(Args, Debug, Clone)]
pub struct TemplateArgs {
    #[command(subcommand)]
    pub action: TemplateAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TemplateAction {
    #[command(visible_alias = "ls", about = "List saved templates.")]
    List {
        #[clap(flatten)]
        format: FormatOpts,
    },
    #[command(about = "Show one template.")]
    Show {
        name: String,
        #[clap(flatten)]
        format: FormatOpts,
    },
    #[command(about = "Create a template from the current selection.")]
    Create {
        name: String,
        #[arg(long, short = 'd', default_value = "")]
        description: String,
        #[clap(flatten)]
        scan: ScanOpts,
        #[clap(flatten)]
        selection: SelectionOpts,
        #[arg(long, value_name = "MODE", value_parser = ["none", "folder", "layer"])]
        group_by: Option<String>,
        #[arg(long, help = "Name exports after the template.")]
        custom_naming: bool,
    },
    #[command(
        about = "Update a template; selection options re-derive its patterns."
    )]
    Update {
        name: String,
        #[arg(long, short = 'd')]
        description: Option<String>,
        #[clap(flatten)]
        scan: ScanOpts,
        #[clap(flatten)]
        selection: SelectionOpts,
        #[arg(long, value_name = "MODE", value_parser = ["none", "folder", "layer"])]
        group_by: Option<String>,
        #[arg(long, value_name = "BOOL")]
        custom_naming: Option<bool>,
    },
    #[command(visible_alias = "rm", about = "Delete a template.")]
    Delete { name: String },
    #[command(about = "Write a template to a JSON file.")]
    Export { name: String, path: PathBuf },
    #[command(about = "Import a template from a JSON file.")]
    Import { path: PathBuf },
    #[command(about = "List the scanned files a template matches.")]
    Match {
        name: String,
        #[clap(flatten)]
        scan: ScanOpts,
        #[clap(flatten)]
        format: FormatOpts,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    #[command(subcommand)]
    pub action: SelectionAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SelectionAction {
    #[command(about = "Write the selected files to a CSV.")]
    Save {
        csv: PathBuf,
        #[clap(flatten)]
        scan: ScanOpts,
        #[clap(flatten)]
        selection: SelectionOpts,
    },
    #[command(about = "Apply a CSV selection to a fresh scan and report the result.")]
    Load {
        csv: PathBuf,
        #[clap(flatten)]
        scan: ScanOpts,
        #[clap(flatten)]
        format: FormatOpts,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    #[command(about = "Print the effective configuration as JSON.")]
    Show,
    #[command(about = "Print the configuration file location.")]
    Path,
    #[command(about = "Set a configuration value (lists are comma separated).")]
    Set { key: String, value: String },
    #[command(about = "Restore the default configuration.")]
    Reset,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionArgs {
    #[arg(
        long,
        value_enum,
        value_name = "SHELL",
        help = "Shell to generate completions for [default: fish]"
    )]
    pub shell: Option<Shell>,
    #[arg(long, help = "Save completion script to the shell's default location.")]
    pub save: bool,
    #[arg(long, requires = "save", help = "Overwrite an existing completion file.")]
    pub force: bool,
}
