use anyhow::Context;
use clap::{ArgAction, Parser};
use mp4seg::{ProtectionData, patch_moov, top_level_boxes};

#[derive(Parser, Debug)]
#[command(version, about = "Inject pssh boxes into the moov of an MP4/ISOBMFF file")]
struct Args {
    /// Input MP4/ISOBMFF file
    input: String,

    /// Output file (required unless --list)
    #[arg(short, long)]
    output: Option<String>,

    /// Protection system: SYSTEM_ID[:HEX_PRIVATE_DATA], repeatable
    #[arg(long = "pssh", value_parser = parse_protection)]
    pssh: Vec<ProtectionData>,

    /// Print the top-level boxes of the input (and output, if written)
    #[arg(long, action = ArgAction::SetTrue)]
    list: bool,

    /// Verbose logging (overridden by RUST_LOG)
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn parse_protection(s: &str) -> Result<ProtectionData, String> {
    let (id, data) = s.split_once(':').unwrap_or((s, ""));
    let private_data = hex::decode(data).map_err(|e| format!("private data: {e}"))?;
    Ok(ProtectionData::new(id, private_data))
}

fn list_boxes(label: &str, data: &[u8]) -> anyhow::Result<()> {
    println!("{label}:");
    for h in top_level_boxes(data) {
        let h = h?;
        println!("  {:>10}  {}  {} bytes", h.start, h.typ, h.size);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        let level = if args.verbose { "debug" } else { "warn" };
        format!("mp4seg={level},psshpatch=info")
    });
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let data = std::fs::read(&args.input).with_context(|| format!("reading {}", args.input))?;
    if args.list {
        list_boxes(&args.input, &data)?;
    }

    let Some(output) = args.output else {
        if !args.list {
            anyhow::bail!("nothing to do: pass --output or --list");
        }
        return Ok(());
    };

    let patched = patch_moov(&data, &args.pssh)?;
    std::fs::write(&output, &patched).with_context(|| format!("writing {output}"))?;
    tracing::info!(
        boxes = args.pssh.len(),
        grew_by = patched.len() - data.len(),
        "wrote {output}"
    );

    if args.list {
        list_boxes(&output, &patched)?;
    }
    Ok(())
}
