//! basalt CLI - run compute kernels, list devices, load IDX datasets.

use anyhow::{Context, Result};
use basalt_cli::dataset::Dataset;
use basalt_runtime::{
    AcceleratorContext, BufferSpecification, ContextConfig, DEFAULT_WORKGROUP_SIZE,
    PipelineSpecification, TaskBuilder,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser)]
#[command(name = "basalt")]
#[command(about = "Synchronous Vulkan compute task runner", long_about = None)]
#[command(version)]
struct Cli {
    /// More log output (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a compute kernel over a source and a destination buffer
    Run {
        /// Path to the SPIR-V kernel
        #[arg(short, long, value_name = "PATH")]
        kernel: PathBuf,

        /// Number of source elements
        #[arg(short, long)]
        count: u32,

        /// Bytes per source element
        #[arg(short, long, default_value = "4")]
        size: u32,

        /// Number of destination elements (defaults to --count)
        #[arg(long)]
        dst_count: Option<u32>,

        /// Bytes per destination element (defaults to --size)
        #[arg(long)]
        dst_size: Option<u32>,

        /// Workgroup size used when the kernel does not declare one
        #[arg(long, default_value_t = DEFAULT_WORKGROUP_SIZE)]
        workgroup_size: u32,

        /// Number of identical tasks to queue
        #[arg(long, default_value = "1")]
        repeat: usize,

        /// Do not request validation layers
        #[arg(long)]
        no_validation: bool,
    },
    /// List the physical devices Vulkan can see
    Devices,
    /// Load an IDX image file and its label file
    Dataset {
        /// IDX3 image file (e.g. train-images-idx3-ubyte)
        #[arg(long, value_name = "PATH")]
        images: PathBuf,

        /// IDX1 label file (e.g. train-labels-idx1-ubyte)
        #[arg(long, value_name = "PATH")]
        labels: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Run {
            kernel,
            count,
            size,
            dst_count,
            dst_size,
            workgroup_size,
            repeat,
            no_validation,
        } => {
            let spec = BufferSpecification::new(
                count,
                size,
                dst_count.unwrap_or(count),
                dst_size.unwrap_or(size),
            );
            cmd_run(kernel, spec, workgroup_size, repeat, !no_validation)
        }
        Commands::Devices => cmd_devices(),
        Commands::Dataset { images, labels } => {
            cmd_dataset(images, labels);
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!("{e:#}");
    }
    result
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

/// Queue `repeat` copies of one task and drain the queue.
fn cmd_run(
    kernel: PathBuf,
    spec: BufferSpecification,
    workgroup_size: u32,
    repeat: usize,
    validation: bool,
) -> Result<()> {
    let config = ContextConfig::default().with_validation(validation);
    let mut context = AcceleratorContext::with_config(config)
        .context("Failed to initialize Vulkan context")?;
    let info = context.device_properties();
    println!("GPU: {} ({:?})", info.name, info.device_type);

    let builder = TaskBuilder::new(&context)
        .shader(&kernel)
        .buffers(spec)
        .pipeline(PipelineSpecification::storage_pair())
        .workgroup_size(workgroup_size);
    let tasks = (0..repeat)
        .map(|i| {
            builder
                .create()
                .with_context(|| format!("Failed to create task {i} from {}", kernel.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    for task in tasks {
        context.push_task(task);
    }

    let reports = context.execute_tasks().context("Task execution failed")?;
    for (i, report) in reports.iter().enumerate() {
        println!(
            "Task {i}: {:?} workgroups in {:.3} ms",
            report.workgroups,
            report.elapsed.as_secs_f64() * 1000.0
        );
        println!("  source:      {:?}", report.source);
        println!("  destination: {:?}", report.destination);
    }
    Ok(())
}

fn cmd_devices() -> Result<()> {
    let context = AcceleratorContext::with_config(ContextConfig::default().with_validation(false))
        .context("Failed to initialize Vulkan context")?;
    let selected = context.device_properties().index;
    for device in context.enumerate_devices()? {
        let marker = if device.index == selected { "*" } else { " " };
        println!("{marker} [{}] {} ({:?})", device.index, device.name, device.device_type);
    }
    println!("Compute queue family: {}", context.compute_queue_family());
    Ok(())
}

fn cmd_dataset(images: PathBuf, labels: PathBuf) {
    let dataset = Dataset::load(&images, &labels);
    println!("Images: {} bytes", dataset.images.len());
    println!("Labels: {} bytes", dataset.labels.len());
}
