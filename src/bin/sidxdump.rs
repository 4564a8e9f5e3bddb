use anyhow::Context;
use clap::{ArgAction, Parser};
use mp4seg::SegmentIndex;

#[derive(Parser, Debug)]
#[command(version, about = "Print the segment index (sidx) of an MP4/ISOBMFF file")]
struct Args {
    /// MP4/ISOBMFF file or index segment
    path: String,

    /// Absolute position right after the sidx box. Defaults to the box end
    /// within the file.
    #[arg(long)]
    anchor: Option<u64>,

    /// Emit JSON instead of a table
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Verbose logging (overridden by RUST_LOG)
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        let level = if args.verbose { "trace" } else { "warn" };
        format!("mp4seg={level}")
    });
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let data = std::fs::read(&args.path).with_context(|| format!("reading {}", args.path))?;
    let index = match args.anchor {
        Some(anchor) => SegmentIndex::parse(&data, anchor)?,
        None => SegmentIndex::parse_at(&data, 0)?,
    };
    let Some(index) = index else {
        anyhow::bail!("{}: no top-level sidx box", args.path);
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&index)?);
        return Ok(());
    }

    println!("timescale: {}", index.timescale);
    println!("earliest presentation time: {}", index.earliest_presentation_time);
    println!(
        "sub-segments: {} ({:.3}s)",
        index.segments.len(),
        index.seconds(index.duration())
    );
    println!("{:>5}  {:>12}  {:>10}  {:>24}", "#", "time", "duration", "bytes");
    for (i, s) in index.segments.iter().enumerate() {
        println!(
            "{:>5}  {:>12.3}  {:>10.3}  {:>24}",
            i,
            index.seconds(s.presentation_time),
            index.seconds(s.duration),
            format!("{}-{}", s.byte_range.first, s.byte_range.last)
        );
    }
    Ok(())
}
