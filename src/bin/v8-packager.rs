use anyhow::Result;
use clap::Parser;

use v8_packager::config::{BuildConfig, Cli};
use v8_packager::toolchain::ToolchainEnv;
use v8_packager::{error, pipeline};

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {:#}", err);
            error::exit_code(&err)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    let config = BuildConfig::resolve(cli)?;
    println!("[config] {:?}", config);
    let env = ToolchainEnv::capture();
    pipeline::run(&config, &env)
}
