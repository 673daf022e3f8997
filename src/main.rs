use clap::Parser;
use log::{error, info};
use std::path::PathBuf;

use coco_toolkit::coco::{Category, CategoryHandler};
use coco_toolkit::config::{
    Cli, Command, CombineArgs, CombineConfigArgs, FromLabelmeArgs, ToLabelmeArgs, VideoArgs,
    VisualizeArgs,
};
use coco_toolkit::utils::{check_can_write, read_json};
use coco_toolkit::{
    CocoDataset, DrawStyle, FrameSequenceSink, FromLabelmeOptions, LabelmeAnnotationHandler,
    Result, VideoOptions, VisualizationOptions,
};

fn main() {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli.command) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::FromLabelme(args) => from_labelme(&args),
        Command::ToLabelme(args) => to_labelme(&args),
        Command::Combine(args) => combine(&args),
        Command::CombineConfig(args) => combine_config(&args),
        Command::Visualize(args) => visualize(&args),
        Command::Video(args) => video(&args),
    }
}

fn from_labelme(args: &FromLabelmeArgs) -> Result<()> {
    check_can_write(&args.output, args.overwrite)?;
    info!("Starting LabelMe to COCO conversion...");

    let categories: Vec<Category> = read_json(&args.categories)?;
    let labelme = LabelmeAnnotationHandler::load_from_dir(&args.json_dir)?;
    let options = FromLabelmeOptions::from(args);
    let dataset =
        CocoDataset::from_labelme(&labelme, CategoryHandler::try_from(categories)?, &options)?;
    dataset.save_to_path(&args.output, args.overwrite)?;

    info!(
        "Converted {} LabelMe files into {} images and {} annotations",
        labelme.len(),
        dataset.images.len(),
        dataset.annotations.len()
    );
    Ok(())
}

fn to_labelme(args: &ToLabelmeArgs) -> Result<()> {
    let dataset = CocoDataset::load_from_path(&args.ann_path, args.img_dir.as_deref(), false)?;
    let labelme = dataset.to_labelme(args.priority)?;
    labelme.save_to_dir(&args.output_dir, args.overwrite)?;
    info!(
        "Wrote {} LabelMe files to {}",
        labelme.len(),
        args.output_dir.display()
    );
    Ok(())
}

fn combine(args: &CombineArgs) -> Result<()> {
    check_can_write(&args.output, args.overwrite)?;
    let datasets = args
        .ann_paths
        .iter()
        .map(|path| CocoDataset::load_from_path(path, None, false))
        .collect::<Result<Vec<_>>>()?;
    let img_dirs: Option<&[PathBuf]> = if args.img_dirs.is_empty() {
        None
    } else {
        Some(args.img_dirs.as_slice())
    };
    let combined = CocoDataset::combine(&datasets, img_dirs)?;
    combined.save_to_path(&args.output, args.overwrite)
}

fn combine_config(args: &CombineConfigArgs) -> Result<()> {
    check_can_write(&args.output, args.overwrite)?;
    let combined = CocoDataset::combine_from_config(&args.config)?;
    combined.save_to_path(&args.output, args.overwrite)
}

fn visualize(args: &VisualizeArgs) -> Result<()> {
    let dataset = CocoDataset::load_from_path(&args.ann_path, args.img_dir.as_deref(), true)?;
    let options = VisualizationOptions {
        save_dir: args.save_dir.clone(),
        preserve_filenames: !args.rename,
        show_annotations: !args.no_annotations,
        overwrite: args.overwrite,
        start_idx: args.start,
        end_idx: args.end,
        style: DrawStyle {
            draw_order: args.draw_order.clone(),
            ..DrawStyle::default()
        },
        show_pbar: true,
    };
    dataset.save_visualization(&options)
}

fn video(args: &VideoArgs) -> Result<()> {
    let dataset = CocoDataset::load_from_path(&args.ann_path, args.img_dir.as_deref(), true)?;
    let options = VideoOptions {
        save_path: args.frame_dir.clone(),
        fps: args.fps,
        rescale_before_pad: !args.no_rescale,
        show_annotations: !args.no_annotations,
        overwrite: args.overwrite,
        show_pbar: true,
        ..VideoOptions::default()
    };
    let mut sink = FrameSequenceSink::new(args.overwrite);
    dataset.save_video(&mut sink, &options)
}
