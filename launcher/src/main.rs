//! The `tally` command-line launcher.

mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tally_common::{init_logging, parse_duration, TallyConfig};
use tally_core::pipeline::render_table;
use tally_core::streaming::{
    ConsoleSink, FileSink, FileStreamSource, MicroBatchSource, SocketSource, StreamSink,
};
use tally_core::{
    AggregateSpec, ConversionPolicy, FileFormat, OutputMode, Pipeline, PipelineOutput, Predicate,
    SaveMode, Source, StreamingQuery, TallyContext, Trigger, WriteOptions,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cli::{Cli, Commands, OutputArgs, RunArgs, StreamArgs, TopArgs};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match load_config(&cli) {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Config file first, then flags on top.
fn load_config(cli: &Cli) -> Result<TallyConfig> {
    let mut config = match &cli.config {
        Some(path) => TallyConfig::from_json_file(path)?,
        None => TallyConfig::default(),
    };
    if let Some(master) = &cli.master {
        config.master = master.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    config.validate()?;
    init_logging(&config.log_level)?;
    Ok(config)
}

async fn run(cli: Cli, config: TallyConfig) -> Result<()> {
    match cli.command {
        Commands::Top(args) => {
            let ctx = TallyContext::init(config)?;
            let result = run_top(&ctx, args);
            ctx.shutdown();
            result
        }
        Commands::Run(args) => {
            let ctx = TallyContext::init(config)?;
            let result = run_pipeline(&ctx, args);
            ctx.shutdown();
            result
        }
        Commands::Stream(args) => {
            let ctx = Arc::new(TallyContext::init(config)?);
            let result = run_stream(Arc::clone(&ctx), args).await;
            Arc::unwrap_or_clone(ctx).shutdown();
            result
        }
    }
}

fn run_top(ctx: &TallyContext, args: TopArgs) -> Result<()> {
    let conversion: ConversionPolicy = args
        .on_invalid
        .parse()
        .map_err(anyhow::Error::msg)?;
    let spec = match args.value {
        Some(value) => AggregateSpec::sum(args.keys.iter().copied(), value),
        None if args.count => AggregateSpec::count(args.keys.iter().copied()),
        None => anyhow::bail!("either --value or --count is required"),
    }
    .with_conversion(conversion);

    let mut builder = Pipeline::builder()
        .delimiter(args.delimiter.unwrap_or(ctx.default_delimiter()))
        .skip_header(args.header);
    if let Some(field) = args.filter_non_empty {
        builder = builder.filter(Predicate::NonEmpty { field });
    }
    let pipeline = builder.aggregate(spec).top(args.top).build()?;

    let result = pipeline.collect(ctx, &Source::path(&args.input))?;
    print_output(&result, args.top);
    Ok(())
}

fn run_pipeline(ctx: &TallyContext, args: RunArgs) -> Result<()> {
    let pipeline = load_pipeline(&args.pipeline)?;
    let source = Source::path(&args.input);
    match write_options(&args.output)? {
        Some(options) => {
            let summary = pipeline.write(ctx, &source, &options)?;
            if summary.skipped {
                println!("{} exists, nothing written", summary.path.display());
            } else {
                println!(
                    "Wrote {} rows in {} files to {}",
                    summary.rows_written,
                    summary.files.len(),
                    summary.path.display()
                );
            }
        }
        None => {
            let result = pipeline.collect(ctx, &source)?;
            print_output(&result, usize::MAX);
        }
    }
    Ok(())
}

fn write_options(args: &OutputArgs) -> Result<Option<WriteOptions>> {
    let Some(path) = &args.output else {
        return Ok(None);
    };
    let mode: SaveMode = args.mode.parse()?;
    let format: FileFormat = args.format.parse()?;
    Ok(Some(
        WriteOptions::new(path)
            .mode(mode)
            .format(format)
            .partition_by(args.partition_by.iter().copied())
            .num_files(args.num_files)
            .header(args.header),
    ))
}

fn load_pipeline(path: &Path) -> Result<Pipeline> {
    Pipeline::from_json_file(path)
        .with_context(|| format!("loading pipeline {}", path.display()))
}

fn print_output(result: &PipelineOutput, max_rows: usize) {
    let output = &result.output;
    print!(
        "{}",
        render_table(&output.default_columns(), &output.to_rows(), max_rows)
    );
    if result.stats.dropped() > 0 {
        println!(
            "({} of {} records dropped)",
            result.stats.dropped(),
            result.stats.lines_read
        );
    }
}

fn parse_trigger(text: &str) -> Result<Trigger> {
    match text.trim().to_ascii_lowercase().as_str() {
        "once" => Ok(Trigger::Once),
        "available-now" | "available_now" => Ok(Trigger::AvailableNow),
        interval => Ok(Trigger::processing_time(interval)?),
    }
}

async fn run_stream(ctx: Arc<TallyContext>, args: StreamArgs) -> Result<()> {
    let pipeline = load_pipeline(&args.pipeline)?;
    let output_mode: OutputMode = args.output_mode.parse()?;
    let format = pipeline.record_format(ctx.default_delimiter());

    let mut builder = StreamingQuery::builder(pipeline)
        .output_mode(output_mode)
        .trigger(parse_trigger(&args.trigger)?)
        .query_name(ctx.app_name());
    if let Some(delay) = &args.watermark {
        builder = builder.watermark(parse_duration(delay)?);
    }
    let query = builder.build()?;

    let mut source: Box<dyn MicroBatchSource> = match (&args.dir, &args.socket) {
        (Some(dir), _) => {
            let mut source = FileStreamSource::new(dir, &format);
            if let Some(max_files) = args.max_files_per_trigger {
                source = source.max_files_per_trigger(max_files);
            }
            Box::new(source)
        }
        (None, Some(addr)) => Box::new(SocketSource::connect(addr).await?),
        (None, None) => anyhow::bail!("either --dir or --socket is required"),
    };
    let mut sink: Box<dyn StreamSink> = match &args.output {
        Some(path) => Box::new(FileSink::new(path, FileFormat::Csv)),
        None => Box::new(ConsoleSink::new()),
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping query");
            on_interrupt.cancel();
        }
    });

    let summary = query
        .run(Arc::clone(&ctx), source.as_mut(), sink.as_mut(), cancel)
        .await?;
    info!(
        "Processed {} batches ({} lines)",
        summary.batches, summary.stats.lines_read
    );
    Ok(())
}
