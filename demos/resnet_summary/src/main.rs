use anyhow::Context;
use brim::models::resnet::{RESNET_CATALOG, ResNet, ResNetFactory, ResNetOptions, lookup_entry};
use brim::utility::params::ParamInventory;
use burn::backend::NdArray;
use burn::module::Module;
use burn::tensor::{Distribution, Tensor};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the catalog variants.
    List,

    /// Print the residual unit plan of a variant.
    Plan {
        #[command(flatten)]
        model: ModelArgs,
    },

    /// Initialize a variant and run a forward pass.
    Init {
        #[command(flatten)]
        model: ModelArgs,

        /// Square input resolution.
        #[arg(long, default_value = "224")]
        resolution: usize,

        /// Print every parameter with its learning-rate multiplier.
        #[arg(long)]
        params: bool,
    },
}

#[derive(clap::Args, Debug)]
struct ModelArgs {
    /// Catalog name, e.g. ``ResNet50_vd``.
    #[arg(long, default_value = "ResNet18")]
    model: String,

    /// Construction options as JSON, e.g. ``{"class_count": 10}``.
    #[arg(long, default_value = "{}")]
    options: String,
}

impl ModelArgs {
    fn options(&self) -> anyhow::Result<ResNetOptions> {
        ResNetOptions::from_json(&self.options).context("parsing --options")
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    match args.command {
        Command::List => list(),
        Command::Plan { model } => plan(&model),
        Command::Init {
            model,
            resolution,
            params,
        } => init(&model, resolution, params),
    }
}

fn list() -> anyhow::Result<()> {
    let options = ResNetOptions::new();
    println!("{:<14} {:>5} {:>4} {:<16} {:>6}", "name", "depth", "var", "block", "units");
    for entry in &RESNET_CATALOG {
        let plan = entry.plan(&options)?;
        println!(
            "{:<14} {:>5} {:>4} {:<16} {:>6}",
            entry.name,
            entry.depth,
            entry.variant.version(),
            plan.stage_config.block_type,
            plan.num_units(),
        );
    }
    Ok(())
}

fn plan(args: &ModelArgs) -> anyhow::Result<()> {
    let entry = lookup_entry(&args.model)?;
    let options = args.options()?;
    let plan = entry.plan(&options)?;

    println!("{} ({})", entry.name, plan.stage_config.block_type);
    for unit in &plan.stem.units {
        println!(
            "  stem     {:>4} -> {:<4} k{} s{}",
            unit.in_channels, unit.out_channels, unit.kernel_size, unit.stride
        );
    }
    for unit in &plan.units {
        println!(
            "  {}.{:<2}    {:>4} -> {:<4} s{} {} lr={}",
            unit.stage,
            unit.index,
            unit.in_channels,
            unit.out_channels(),
            unit.stride,
            match (unit.shortcut, unit.is_first_unit_of_first_stage) {
                (true, _) => "identity",
                (false, true) => "project",
                (false, false) => "pool+project",
            },
            unit.lr_multiplier,
        );
    }
    println!("  head     {:>4} -> {}", plan.head_width(), options.class_count);
    Ok(())
}

fn init(
    args: &ModelArgs,
    resolution: usize,
    print_params: bool,
) -> anyhow::Result<()> {
    type B = NdArray;
    let device = Default::default();

    let options = args.options()?;
    let plan = lookup_entry(&args.model)?.plan(&options)?;
    let [height, width] = plan
        .maybe_output_resolution([resolution, resolution])
        .with_context(|| format!("resolution {resolution} is too small for {}", args.model))?;

    tracing::info!(model = %args.model, pretrained = ?options.pretrained, "building");
    let model: ResNet<B> = ResNetFactory::default().build(&args.model, &options, &device)?;

    println!("{}: {} parameters", args.model, model.num_params());
    if print_params {
        for param in model.param_descriptors() {
            println!("  {:<40} {:?} lr={}", param.path, param.shape, param.lr_multiplier);
        }
    }

    let input: Tensor<B, 4> =
        Tensor::random([1, 3, resolution, resolution], Distribution::Default, &device);
    let logits = model.forward(input);

    println!(
        "forward: [1, 3, {resolution}, {resolution}] -> features {height}x{width} -> logits {:?}",
        logits.dims()
    );
    Ok(())
}
