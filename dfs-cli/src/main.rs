mod cli;
mod report;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use dfs::io::{DiskImage, DiskImageBuilder};
use dfs::{DfsError, FormatOptions};
use log::{error, info};
use thiserror::Error;

use crate::cli::{Cli, Command};

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Dfs(#[from] DfsError),
    #[error("{}: {}", .path.display(), .source)]
    Host { path: PathBuf, source: io::Error },
    #[error("cannot derive an image name from {0:?}, pass --name")]
    NoName(PathBuf),
    #[error("writing output failed: {0}")]
    Output(#[from] io::Error),
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(err) = run(cli.command) {
        error!("{:?}", err);
        eprintln!("error: {}", err);
        process::exit(1);
    }
}

fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Format {
            image,
            size,
            granularity,
        } => format(
            &image,
            &FormatOptions {
                partition_size: size,
                granularity,
            },
        ),
        Command::List { image } => list(&image),
        Command::Append {
            image,
            source,
            name,
        } => append(&image, &source, name),
        Command::Cat {
            image,
            name,
            output,
        } => cat(&image, &name, output.as_deref()),
    }
}

fn format(image: &Path, options: &FormatOptions) -> Result<(), CliError> {
    // Building the image zeroes the host file, so reject bad geometry first.
    options.validate()?;
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(image)
        .map_err(|source| host(image, source))?;
    let mut disk = DiskImageBuilder::from(fd)
        .with_size(options.partition_size)
        .build()?;
    options.format(disk.buffer_mut())?;
    disk.save()?;

    let info = dfs::info(disk.buffer())?;
    println!(
        "formatted {}: {} granules of {} bytes, {} free",
        image.display(),
        info.granules,
        info.granularity,
        info.free_granules
    );
    Ok(())
}

fn list(image: &Path) -> Result<(), CliError> {
    let disk = open(image)?;
    let info = dfs::info(disk.buffer())?;
    let entries = dfs::list(disk.buffer())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    report::write_listing(&mut out, &info, entries)
}

fn append(image: &Path, source: &Path, name: Option<String>) -> Result<(), CliError> {
    let name = match name {
        Some(name) => name,
        None => source
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
            .ok_or_else(|| CliError::NoName(source.to_path_buf()))?,
    };
    let content = fs::read(source).map_err(|err| host(source, err))?;

    let mut disk = open(image)?;
    dfs::append(disk.buffer_mut(), &name, &content)?;
    disk.save()?;
    info!("appended {} as {:?}", source.display(), name);
    Ok(())
}

fn cat(image: &Path, name: &str, output: Option<&Path>) -> Result<(), CliError> {
    let disk = open(image)?;
    let content = dfs::read_file(disk.buffer(), name)?;
    match output {
        Some(path) => fs::write(path, &content).map_err(|err| host(path, err))?,
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            out.write_all(&content)?;
            out.flush()?;
        }
    }
    Ok(())
}

fn open(image: &Path) -> Result<DiskImage, CliError> {
    DiskImage::open(image).map_err(|err| match err {
        DfsError::IoFailure(source) => host(image, source),
        other => CliError::Dfs(other),
    })
}

fn host(path: &Path, source: io::Error) -> CliError {
    CliError::Host {
        path: path.to_path_buf(),
        source,
    }
}
