use std::time::Duration;

use anyhow::{Context, bail};
use args::Args;
use clap::Parser;
use log::{LevelFilter, error, info};
use tokio::sync::mpsc;

use viewfinder::file_handle::{DirectoryHandle, FileHandle};
use viewfinder::host::{DirectoryPicker, NullHostDelegate};
use viewfinder::mirror::Mirror;
use viewfinder::pipe::PipeEnd;
use viewfinder::session::{LaunchEvent, SessionController};

mod args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .init();

    let args = Args::parse();

    if !args.focus.exists() {
        error!("Focus file {:?} does not exist", args.focus);
        std::process::exit(1);
    }
    if !args.focus.is_file() {
        error!("Focus file {:?} is not a regular file", args.focus);
        std::process::exit(1);
    }

    let focus = args
        .focus
        .canonicalize()
        .with_context(|| format!("failed to canonicalize {:?}", args.focus))?;
    let directory = match &args.directory {
        Some(directory) => directory
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {:?}", directory))?,
        None => focus
            .parent()
            .context("focus file has no parent directory")?
            .to_path_buf(),
    };
    if !directory.is_dir() {
        error!("Launch directory {:?} is not a directory", directory);
        std::process::exit(1);
    }

    info!("Launch directory: {:?}", directory);
    info!("Focus file: {:?}", focus.file_name().unwrap_or_default());

    let directory = DirectoryHandle::new(directory);
    let focus = FileHandle::new(focus);

    let (host_end, guest_end) = PipeEnd::pair();
    let (launch_tx, launch_rx) = mpsc::unbounded_channel();

    let controller = SessionController::new(
        host_end,
        Box::new(DirectoryPicker::new(directory.clone())),
        Box::new(NullHostDelegate),
        args.sort_order,
    );
    let session = tokio::spawn(controller.serve(launch_rx));

    let (mirror, pump) = Mirror::attach(guest_end).await?;
    let pump = tokio::spawn(pump.run());

    if launch_tx
        .send(LaunchEvent::Directory { directory, focus })
        .is_err()
    {
        bail!("session ended before the launch was delivered");
    }

    // Give the background sibling scan a moment to land, then show the
    // navigation ring the untrusted side ended up with.
    tokio::time::sleep(Duration::from_millis(args.scan_wait_ms)).await;

    let current_index = mirror.current_index();
    info!("Navigation ring ({} files):", mirror.len());
    for (index, file) in mirror.files().iter().enumerate() {
        let marker = if index as i64 == current_index {
            '>'
        } else {
            ' '
        };
        let error = file.error();
        if error.is_empty() {
            info!("{marker} [{index}] {}", file.name());
        } else {
            info!("{marker} [{index}] {} (error: {error})", file.name());
        }
    }
    if let Some(sidecar) = mirror.sidecar() {
        info!("  subtitles: {}", sidecar.name());
    }

    // Closing the launch channel ends the session; the pump follows when
    // the host end drops.
    drop(launch_tx);
    session.await?;
    pump.await?;
    Ok(())
}
