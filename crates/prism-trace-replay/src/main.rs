use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use prism_replay::{EventId, ResourceId};
use prism_trace::TraceReader;
use prism_trace_replay::{
    event_tree_to_json, history_to_json, open_controller, replay_trace,
};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "prism-trace-replay", about = "Inspect and replay prism capture files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the capture header, meta JSON and frame table.
    Info { trace: PathBuf },
    /// Print the event tree as JSON.
    Events { trace: PathBuf },
    /// Replay every frame and print its extent and SHA-256 digest.
    Replay { trace: PathBuf },
    /// Replay and write one presented frame as PNG.
    Dump {
        trace: PathBuf,
        #[arg(long, default_value_t = 0)]
        frame: u32,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Reposition to an event and read one pixel of color target 0.
    Pixel {
        trace: PathBuf,
        #[arg(long)]
        event: u32,
        #[arg(short, long)]
        x: u32,
        #[arg(short, long)]
        y: u32,
    },
    /// Pixel history of color target 0 at an event, as JSON.
    History {
        trace: PathBuf,
        #[arg(long)]
        event: u32,
        #[arg(short, long)]
        x: u32,
        #[arg(short, long)]
        y: u32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    match cli.command {
        Command::Info { trace } => info(&trace),
        Command::Events { trace } => events(&trace),
        Command::Replay { trace } => replay(&trace),
        Command::Dump {
            trace,
            frame,
            output,
        } => dump(&trace, frame, &output),
        Command::Pixel { trace, event, x, y } => pixel(&trace, event, x, y),
        Command::History { trace, event, x, y } => history(&trace, event, x, y),
    }
}

fn open_file(path: &PathBuf) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("open trace {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn info(path: &PathBuf) -> Result<()> {
    let reader = TraceReader::open(open_file(path)?).context("parse trace container")?;
    println!("container version: {}", reader.header.container_version);
    println!("command ABI:       {}", reader.header.command_abi_version);
    match serde_json::from_slice::<serde_json::Value>(&reader.meta_json) {
        Ok(meta) => println!("meta:              {meta}"),
        Err(_) => println!("meta:              {}", String::from_utf8_lossy(&reader.meta_json)),
    }
    println!("frames:            {}", reader.frame_entries().len());
    for entry in reader.frame_entries() {
        println!(
            "  frame {}: records [{}, {}) present_at={}",
            entry.frame_index,
            entry.start_offset,
            entry.end_offset,
            entry.present_offset,
        );
    }
    Ok(())
}

fn events(path: &PathBuf) -> Result<()> {
    let controller = open_controller(open_file(path)?).context("open capture for replay")?;
    let tree = event_tree_to_json(controller.event_tree());
    println!("{}", serde_json::to_string_pretty(&tree)?);
    Ok(())
}

fn replay(path: &PathBuf) -> Result<()> {
    let frames = replay_trace(open_file(path)?).context("replay capture")?;
    for frame in frames {
        println!(
            "frame {}: {}x{} sha256={}",
            frame.frame_index,
            frame.width,
            frame.height,
            frame.sha256()
        );
    }
    Ok(())
}

fn dump(path: &PathBuf, frame_index: u32, output: &PathBuf) -> Result<()> {
    let frames = replay_trace(open_file(path)?).context("replay capture")?;
    let Some(frame) = frames.iter().find(|f| f.frame_index == frame_index) else {
        bail!(
            "frame {frame_index} was never presented ({} frames replayed)",
            frames.len()
        );
    };
    let file = File::create(output).with_context(|| format!("create {}", output.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), frame.width, frame.height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().context("write PNG header")?;
    writer
        .write_image_data(&frame.rgba8)
        .context("write PNG image data")?;
    println!(
        "wrote frame {} ({}x{}) to {}",
        frame.frame_index,
        frame.width,
        frame.height,
        output.display()
    );
    Ok(())
}

fn pixel(path: &PathBuf, event: u32, x: u32, y: u32) -> Result<()> {
    let mut controller = open_controller(open_file(path)?).context("open capture for replay")?;
    controller
        .set_frame_event(EventId(event), false)
        .with_context(|| format!("set replay position to event {event}"))?;
    let target = first_color_target(&controller)?;
    let value = controller.read_pixel(target, x, y).context("read pixel")?;
    println!(
        "event {event} target {:?} pixel ({x}, {y}) = [{}, {}, {}, {}]",
        target, value[0], value[1], value[2], value[3]
    );
    Ok(())
}

fn history(path: &PathBuf, event: u32, x: u32, y: u32) -> Result<()> {
    let mut controller = open_controller(open_file(path)?).context("open capture for replay")?;
    controller
        .set_frame_event(EventId(event), false)
        .with_context(|| format!("set replay position to event {event}"))?;
    let target = first_color_target(&controller)?;
    let mods = controller
        .pixel_history(target, x, y)
        .context("pixel history")?;
    println!("{}", serde_json::to_string_pretty(&history_to_json(&mods))?);
    Ok(())
}

fn first_color_target(controller: &prism_replay::ReplayController) -> Result<ResourceId> {
    let pipe = controller.pipeline_state().context("pipeline state")?;
    let Some(target) = pipe.output_targets().first() else {
        bail!("no color target bound at the current event");
    };
    Ok(target.resource)
}
