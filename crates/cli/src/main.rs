//
// Copyright (c) 2025 TRUSTEDGE LABS LLC
// This source code is subject to the terms of the Mozilla Public License, v. 2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Project: trustedge — Privacy and trust at the edge.
//

use std::io::{self, IsTerminal, Write as _};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use aipk_core::builder::{create_package, BuildOptions, BuilderError, Compression};

#[derive(Parser, Debug)]
#[command(author, version, about = "Encrypted Chart Package builder", long_about = None)]
struct Cli {
    /// Log verbosity: DEBUG, INFO, WARNING, ERROR.
    #[arg(long = "log-level", global = true, default_value = "INFO")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a chart directory tree and write a sealed .aipk package.
    Build(BuildCmd),
}

#[derive(clap::Args, Debug)]
struct BuildCmd {
    /// Source directory of airport/category chart folders.
    source: PathBuf,
    /// Output path for the sealed package.
    output: PathBuf,
    /// Version tag recorded in the package header; auto-detected when omitted.
    #[arg(short = 'v', long = "version")]
    version: Option<String>,
    /// Encryption password; prompted for (twice) when omitted.
    #[arg(short = 'p', long = "password")]
    password: Option<String>,
    /// Compression algorithm applied to entry payloads before sealing.
    #[arg(short = 'c', long = "compression", value_parser = ["gzip", "none"], default_value = "gzip")]
    compression: String,
    /// Compression level 1-9, ignored when compression is "none".
    #[arg(short = 'l', long = "level", default_value_t = 6, value_parser = clap::value_parser!(u32).range(1..=9))]
    level: u32,
    /// Suppress the progress bar.
    #[arg(long = "no-progress")]
    no_progress: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match &cli.command {
        Commands::Build(cmd) => match run_build(cmd) {
            Ok(()) => process::exit(0),
            Err(err) => {
                tracing::error!(error = %err, "build failed");
                eprintln!("\nerror: {err:#}");
                process::exit(1);
            }
        },
    }
}

fn init_logging(level: &str) {
    let filter = match level.to_ascii_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" | "WARN" => "warn",
        "ERROR" => "error",
        _ => "info",
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();
}

fn run_build(cmd: &BuildCmd) -> Result<()> {
    if !cmd.source.exists() {
        bail!("source directory does not exist: {}", cmd.source.display());
    }
    if !cmd.source.is_dir() {
        bail!("source path is not a directory: {}", cmd.source.display());
    }

    let password = match &cmd.password {
        Some(p) => p.clone(),
        None => prompt_password()?,
    };

    if cmd.output.exists() {
        if io::stdin().is_terminal() {
            print!("file already exists: {} — overwrite? [y/N]: ", cmd.output.display());
            io::stdout().flush().ok();
            let mut answer = String::new();
            io::stdin().read_line(&mut answer)?;
            let answer = answer.trim().to_ascii_lowercase();
            if answer != "y" && answer != "yes" {
                println!("cancelled");
                return Ok(());
            }
        }
    }

    let compression = match cmd.compression.as_str() {
        "none" => Compression::None,
        _ => Compression::Gzip,
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
        })
        .context("failed to install interrupt handler")?;
    }

    println!("\n{}", "=".repeat(60));
    println!("building encrypted chart package");
    println!("{}", "=".repeat(60));
    println!("source:      {}", cmd.source.display());
    println!("output:      {}", cmd.output.display());
    println!("compression: {}", cmd.compression);
    if compression == Compression::Gzip {
        println!("level:       {}", cmd.level);
    }
    println!("{}", "=".repeat(60));
    println!();

    let show_progress = !cmd.no_progress;
    let interrupted_cb = Arc::clone(&interrupted);
    let mut progress = move |current: u64, total: u64, message: &str| -> bool {
        if interrupted_cb.load(Ordering::SeqCst) {
            return false;
        }
        if show_progress {
            if total > 0 {
                let percentage = (current * 100 / total).min(100);
                let filled = (40 * current / total).min(40) as usize;
                let bar = format!("{}{}", "=".repeat(filled), "-".repeat(40 - filled));
                print!("\r[{bar}] {percentage}% - {message}");
            } else {
                print!("\r{message}");
            }
            io::stdout().flush().ok();
        }
        true
    };

    let opts = BuildOptions {
        password,
        version_tag: cmd.version.clone(),
        compression,
        level: cmd.level,
        progress: Some(&mut progress),
    };

    // The builder observes the cancellation signal internally, cleans up its
    // `*.tmp` file, and returns `Interrupted` — only then is it safe to exit
    // with the conventional SIGINT status, after cleanup has already run.
    let stats = match create_package(&cmd.source, &cmd.output, opts) {
        Ok(stats) => stats,
        Err(BuilderError::Interrupted) => {
            println!("\n\noperation interrupted by user");
            process::exit(130);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to build package at {}", cmd.output.display()));
        }
    };

    if show_progress {
        println!();
    }

    println!("\n{}", "=".repeat(60));
    println!("build complete");
    println!("{}", "=".repeat(60));
    println!("output:            {}", cmd.output.display());
    println!("total files:       {}", stats.total_files);
    println!("airports:          {}", stats.airports_count);
    println!("original size:     {:.2} MB", stats.original_size as f64 / 1024.0 / 1024.0);
    println!("compressed size:   {:.2} MB", stats.compressed_size as f64 / 1024.0 / 1024.0);
    println!("final size:        {:.2} MB", stats.final_size as f64 / 1024.0 / 1024.0);
    println!("compression ratio: {:.1}%", stats.compression_ratio * 100.0);
    println!("{}", "=".repeat(60));

    Ok(())
}

fn prompt_password() -> Result<String> {
    println!("enter encryption password (at least 8 characters, 12+ recommended)");
    let password = rpassword::prompt_password("password: ").context("failed to read password")?;
    let confirm = rpassword::prompt_password("confirm password: ").context("failed to read password")?;
    if password != confirm {
        bail!("passwords do not match");
    }
    if password.len() < 8 {
        bail!("password must be at least 8 characters");
    }
    Ok(password)
}
