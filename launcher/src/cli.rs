//! Command-line arguments for the `tally` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Keyed aggregation over delimited and JSON-lines text
#[derive(Debug, Parser)]
#[command(name = "tally")]
#[command(about = "tally - keyed aggregation over text records", long_about = None)]
#[command(version)]
pub struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Master string: local, local[N] or local[*]
    #[arg(long, global = true)]
    pub master: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Rank keys by the sum (or count) of a value field
    Top(TopArgs),

    /// Run a pipeline described in a JSON file
    Run(RunArgs),

    /// Run a pipeline over a stream of micro-batches
    Stream(StreamArgs),
}

#[derive(Debug, Args)]
pub struct TopArgs {
    /// Input file or directory
    #[arg(short, long)]
    pub input: PathBuf,

    /// Key field index; repeat for composite keys
    #[arg(short, long = "key", required = true)]
    pub keys: Vec<usize>,

    /// Value field index to sum
    #[arg(short, long, conflicts_with = "count")]
    pub value: Option<usize>,

    /// Count records per key instead of summing a field
    #[arg(long)]
    pub count: bool,

    /// Number of rows to keep
    #[arg(short = 'n', long, default_value = "10")]
    pub top: usize,

    /// Field delimiter; defaults to the configured delimiter
    #[arg(short, long)]
    pub delimiter: Option<char>,

    /// Skip the first line of every input file
    #[arg(long)]
    pub header: bool,

    /// What to do with non-numeric values: drop, zero or fail
    #[arg(long, default_value = "drop")]
    pub on_invalid: String,

    /// Only keep records where this field is non-empty
    #[arg(long, value_name = "FIELD")]
    pub filter_non_empty: Option<usize>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Pipeline description (JSON)
    #[arg(short, long)]
    pub pipeline: PathBuf,

    /// Input file or directory
    #[arg(short, long)]
    pub input: PathBuf,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Write results under this directory instead of printing them
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Save mode: append, overwrite, ignore or error
    #[arg(long, default_value = "error")]
    pub mode: String,

    /// Output format: csv or json
    #[arg(long, default_value = "csv")]
    pub format: String,

    /// Column index to partition output directories by; repeatable
    #[arg(long)]
    pub partition_by: Vec<usize>,

    /// Part files per output directory
    #[arg(long, default_value = "1")]
    pub num_files: usize,

    /// Write a header line in CSV output
    #[arg(long)]
    pub header: bool,
}

#[derive(Debug, Args)]
pub struct StreamArgs {
    /// Pipeline description (JSON)
    #[arg(short, long)]
    pub pipeline: PathBuf,

    /// Watch a directory for new files
    #[arg(long, conflicts_with = "socket", required_unless_present = "socket")]
    pub dir: Option<PathBuf>,

    /// Read newline-delimited text from host:port
    #[arg(long)]
    pub socket: Option<String>,

    /// Trigger: an interval such as "10 seconds", "once" or "available-now"
    #[arg(long, default_value = "once")]
    pub trigger: String,

    /// Output mode: append, update or complete
    #[arg(long, default_value = "append")]
    pub output_mode: String,

    /// Files read per trigger from --dir
    #[arg(long)]
    pub max_files_per_trigger: Option<usize>,

    /// Watermark delay for windowed aggregations, e.g. "10 minutes"
    #[arg(long)]
    pub watermark: Option<String>,

    /// Append each batch to part files under this directory instead of
    /// printing it
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_top() {
        let cli = Cli::try_parse_from([
            "tally", "--master", "local[2]", "top", "-i", "sales.csv", "-k", "0", "-v", "2", "-n", "3",
        ])
        .unwrap();
        assert_eq!(cli.master.as_deref(), Some("local[2]"));
        let Commands::Top(args) = cli.command else {
            panic!("expected top");
        };
        assert_eq!(args.keys, vec![0]);
        assert_eq!(args.value, Some(2));
        assert_eq!(args.top, 3);
    }

    #[test]
    fn test_value_conflicts_with_count() {
        let result = Cli::try_parse_from([
            "tally", "top", "-i", "x", "-k", "0", "-v", "1", "--count",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_stream_needs_a_source() {
        assert!(Cli::try_parse_from(["tally", "stream", "-p", "p.json"]).is_err());
        let cli = Cli::try_parse_from([
            "tally", "stream", "-p", "p.json", "--socket", "localhost:9999", "--trigger", "5 seconds",
        ])
        .unwrap();
        let Commands::Stream(args) = cli.command else {
            panic!("expected stream");
        };
        assert_eq!(args.trigger, "5 seconds");
    }
}
